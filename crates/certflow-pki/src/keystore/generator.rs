//! 密钥生成模块
//!
//! RSA 密钥由 `rsa` 生成后以 PKCS#8 导入 rcgen；EC 密钥直接由 rcgen 生成。

use rcgen::{
    KeyPair, SignatureAlgorithm as RcgenAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384,
    PKCS_RSA_SHA256, PKCS_RSA_SHA384, PKCS_RSA_SHA512,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};

use crate::{
    error::{PkiError, Result},
    types::{KeyAlgorithm, SignatureAlgorithm},
};

/// 签名算法与密钥算法组合对应的 rcgen 算法
pub fn signing_algorithm(
    signature: SignatureAlgorithm,
    key: KeyAlgorithm,
) -> Result<&'static RcgenAlgorithm> {
    if signature.is_rsa() != key.is_rsa() {
        return Err(PkiError::MalformedInput(format!(
            "Signature algorithm {signature} is incompatible with key algorithm {key}"
        )));
    }

    match (signature, key) {
        (SignatureAlgorithm::RsaSha256, _) => Ok(&PKCS_RSA_SHA256),
        (SignatureAlgorithm::RsaSha384, _) => Ok(&PKCS_RSA_SHA384),
        (SignatureAlgorithm::RsaSha512, _) => Ok(&PKCS_RSA_SHA512),
        (SignatureAlgorithm::EcdsaSha256, KeyAlgorithm::EcdsaP256) => Ok(&PKCS_ECDSA_P256_SHA256),
        (SignatureAlgorithm::EcdsaSha384, KeyAlgorithm::EcdsaP384) => Ok(&PKCS_ECDSA_P384_SHA384),
        _ => Err(PkiError::Unsupported(format!(
            "Signature algorithm {signature} with key algorithm {key} is not supported"
        ))),
    }
}

fn rsa_bits(key: KeyAlgorithm) -> Option<usize> {
    match key {
        KeyAlgorithm::Rsa2048 => Some(2048),
        KeyAlgorithm::Rsa3072 => Some(3072),
        KeyAlgorithm::Rsa4096 => Some(4096),
        _ => None,
    }
}

/// 生成新的密钥对
pub fn generate_key_pair(key: KeyAlgorithm, signature: SignatureAlgorithm) -> Result<KeyPair> {
    let alg = signing_algorithm(signature, key)?;

    match rsa_bits(key) {
        Some(bits) => {
            let private_key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), bits)
                .map_err(|e| PkiError::KeyError(format!("Failed to generate RSA key: {e}")))?;
            let pem = private_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| PkiError::KeyError(format!("Failed to encode RSA key: {e}")))?;
            KeyPair::from_pkcs8_pem_and_sign_algo(&pem, alg)
                .map_err(|e| PkiError::KeyError(format!("Failed to load RSA key: {e}")))
        }
        None => KeyPair::generate_for(alg)
            .map_err(|e| PkiError::KeyError(format!("Failed to generate EC key: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ec_key_pair() {
        let kp = generate_key_pair(KeyAlgorithm::EcdsaP256, SignatureAlgorithm::EcdsaSha256).unwrap();
        assert!(kp.serialize_pem().contains("PRIVATE KEY"));
        assert!(kp.is_compatible(&PKCS_ECDSA_P256_SHA256));
    }

    #[test]
    fn test_generate_rsa_key_pair() {
        let kp = generate_key_pair(KeyAlgorithm::Rsa2048, SignatureAlgorithm::RsaSha384).unwrap();
        assert!(kp.is_compatible(&PKCS_RSA_SHA384));
    }

    #[test]
    fn test_family_mismatch() {
        let err = generate_key_pair(KeyAlgorithm::EcdsaP256, SignatureAlgorithm::RsaSha256).unwrap_err();
        assert!(matches!(err, PkiError::MalformedInput(_)));
    }

    #[test]
    fn test_unsupported_combinations() {
        for (sig, key) in [
            (SignatureAlgorithm::EcdsaSha512, KeyAlgorithm::EcdsaP521),
            (SignatureAlgorithm::EcdsaSha384, KeyAlgorithm::EcdsaP256),
        ] {
            assert!(matches!(signing_algorithm(sig, key), Err(PkiError::Unsupported(_))));
        }
    }
}
