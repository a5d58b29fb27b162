//! 签发编排
//!
//! 解析配置文件与策略，按签发路径分派，并在一个事务中保存证书、
//! 加密正文与私钥、请求状态和元数据。

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    defaults::apply_profile_defaults,
    queue::{AsyncIssuanceQueue, IssuanceJob},
    route::IssuanceRoute,
    IssuanceResult, IssuedCertificate,
};
use crate::{
    ca::{
        validate_algorithm_compatibility, validate_ca_support, CaIssuedCertificate, CaSigner,
        CertificateAuthority, IssueFromCaParams, SignFromCaParams,
    },
    cert::{
        build_certificate_subject, build_subject_alt_names, generator::generate_self_signed_at,
        resolve_validity, validity_days, Certificate, CertificateStatus, SelfSignedCertificate,
    },
    csr::Csr,
    error::{PkiError, Result},
    keystore::KeyVault,
    lifecycle::RenewalConfig,
    policy::{CompiledPolicy, PolicyValidator},
    profile::{EnrollmentType, ProfileWithConfigs},
    ra::{CertificateRequest, CertificateRequestInput, RequestStatus, ResourceMetadata, ValidityRequest},
    store::{
        CaStore, CertificateRequestStore, CertificateStore, EncryptedBody, MemoryStore, PolicyStore,
        ProfileStore, TxContext, TxOp,
    },
    types::{
        ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, Ttl, DEFAULT_KEY_ALGORITHM,
        DEFAULT_SIGNATURE_ALGORITHM,
    },
};

pub(crate) const REQUEST_VALIDATION_CONTEXT: &str = "Certificate request validation failed";

/// 编排器依赖的外部组件
#[derive(Clone)]
pub struct IssuanceDeps {
    pub policies: Arc<dyn PolicyStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub cas: Arc<dyn CaStore>,
    pub requests: Arc<dyn CertificateRequestStore>,
    pub certificates: Arc<dyn CertificateStore>,
    pub signer: Arc<dyn CaSigner>,
    pub vault: Arc<dyn KeyVault>,
    pub queue: Arc<dyn AsyncIssuanceQueue>,
}

impl IssuanceDeps {
    /// 全部存储接口由同一个内存存储提供
    pub fn with_memory_store(
        store: Arc<MemoryStore>,
        signer: Arc<dyn CaSigner>,
        vault: Arc<dyn KeyVault>,
        queue: Arc<dyn AsyncIssuanceQueue>,
    ) -> Self {
        Self {
            policies: store.clone(),
            profiles: store.clone(),
            cas: store.clone(),
            requests: store.clone(),
            certificates: store,
            signer,
            vault,
            queue,
        }
    }
}

/// 一次签发所需的已解析上下文
pub(crate) struct IssuanceContext {
    pub request_id: Option<Uuid>,
    pub project_id: Uuid,
    pub profile: ProfileWithConfigs,
    pub policy: Arc<CompiledPolicy>,
    pub input: CertificateRequestInput,
    pub csr: Option<String>,
    pub metadata: Vec<ResourceMetadata>,
    pub is_renewal: bool,
}

/// 处理器产出的证书材料
pub(crate) struct IssuedArtifact {
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    pub issuing_ca_certificate_pem: String,
    pub private_key_pem: Option<String>,
    pub serial_number: String,
    pub common_name: Option<String>,
    pub alt_names: String,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub ca_id: Option<Uuid>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub key_algorithm: Option<KeyAlgorithm>,
}

impl IssuedArtifact {
    fn from_ca(
        issued: CaIssuedCertificate,
        ca_id: Uuid,
        signature_algorithm: Option<SignatureAlgorithm>,
        key_algorithm: Option<KeyAlgorithm>,
    ) -> Self {
        Self {
            certificate_pem: issued.certificate_pem,
            certificate_chain_pem: issued.certificate_chain_pem,
            issuing_ca_certificate_pem: issued.issuing_ca_certificate_pem,
            private_key_pem: issued.private_key_pem,
            serial_number: issued.serial_number,
            common_name: issued.common_name,
            alt_names: issued.alt_names,
            key_usages: issued.key_usages,
            extended_key_usages: issued.extended_key_usages,
            not_before: issued.not_before,
            not_after: issued.not_after,
            ca_id: Some(ca_id),
            signature_algorithm,
            key_algorithm,
        }
    }

    fn from_self_signed(
        generated: SelfSignedCertificate,
        common_name: String,
        input: &CertificateRequestInput,
        signature_algorithm: SignatureAlgorithm,
        key_algorithm: KeyAlgorithm,
    ) -> Self {
        Self {
            certificate_chain_pem: generated.certificate_pem.clone(),
            certificate_pem: generated.certificate_pem,
            issuing_ca_certificate_pem: String::new(),
            private_key_pem: Some(generated.private_key_pem),
            serial_number: generated.serial_number,
            common_name: Some(common_name),
            alt_names: generated.alt_names,
            key_usages: input.key_usages().to_vec(),
            extended_key_usages: input.extended_key_usages().to_vec(),
            not_before: generated.not_before,
            not_after: generated.not_after,
            ca_id: None,
            signature_algorithm: Some(signature_algorithm),
            key_algorithm: Some(key_algorithm),
        }
    }
}

/// 处理器结果
pub(crate) enum RouteOutcome {
    Queued,
    Issued(IssuedArtifact),
}

/// 请求 → 原证书 → 默认值
pub fn effective_algorithms(
    request: (Option<SignatureAlgorithm>, Option<KeyAlgorithm>),
    original: (Option<SignatureAlgorithm>, Option<KeyAlgorithm>),
) -> (SignatureAlgorithm, KeyAlgorithm) {
    (
        request.0.or(original.0).unwrap_or(DEFAULT_SIGNATURE_ALGORITHM),
        request.1.or(original.1).unwrap_or(DEFAULT_KEY_ALGORITHM),
    )
}

/// 签发编排器
pub struct IssuanceOrchestrator {
    pub(crate) deps: IssuanceDeps,
}

impl IssuanceOrchestrator {
    pub fn new(deps: IssuanceDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &IssuanceDeps {
        &self.deps
    }

    /// 处理一条待签发的证书请求
    ///
    /// 请求必须处于 `pending`。任何错误都会把请求标记为 `failed` 并原样返回。
    pub async fn issue_certificate(&self, request_id: Uuid) -> Result<IssuanceResult> {
        let request = self
            .deps
            .requests
            .find_request_by_id(request_id)
            .await?
            .ok_or_else(|| PkiError::NotFound("Certificate request not found".to_string()))?;

        if request.status != RequestStatus::Pending {
            return Err(PkiError::BadRequest(format!(
                "Certificate request is {}, must be pending",
                request.status
            )));
        }
        self.deps
            .requests
            .update_request_status(request_id, RequestStatus::Pending, None)
            .await?;

        match self.process_request(&request, OffsetDateTime::now_utc()).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%request_id, error = %message, "certificate request failed");
                if let Err(mark_err) = self
                    .deps
                    .requests
                    .update_request_status(request_id, RequestStatus::Failed, Some(message))
                    .await
                {
                    tracing::error!(%request_id, error = %mark_err, "failed to mark certificate request as failed");
                }
                Err(err)
            }
        }
    }

    async fn process_request(&self, request: &CertificateRequest, now: OffsetDateTime) -> Result<IssuanceResult> {
        let profile_id = request
            .profile_id
            .ok_or_else(|| PkiError::BadRequest("Certificate request has no profile".to_string()))?;
        let profile = self.load_profile(profile_id).await?;
        let policy = self.load_policy(&profile).await?;
        let route = IssuanceRoute::select(&profile, request.csr.is_some())?;

        let input = match route {
            IssuanceRoute::CsrSigning => request.input.clone(),
            _ => apply_profile_defaults(&request.input, &profile.profile.defaults),
        };

        let ctx = IssuanceContext {
            request_id: Some(request.id),
            project_id: request.project_id,
            profile,
            policy,
            input,
            csr: request.csr.clone(),
            metadata: request.metadata.clone(),
            is_renewal: false,
        };
        self.dispatch(route, ctx, now).await
    }

    /// 不经请求记录，直接通过 API 注册的配置文件签发
    pub async fn issue_from_profile(
        &self,
        profile_id: Uuid,
        input: CertificateRequestInput,
    ) -> Result<IssuanceResult> {
        let profile = self.load_profile(profile_id).await?;
        profile.profile.ensure_enrollment(EnrollmentType::Api)?;
        let policy = self.load_policy(&profile).await?;
        let route = IssuanceRoute::select(&profile, false)?;

        let ctx = IssuanceContext {
            request_id: None,
            project_id: profile.profile.project_id,
            input: apply_profile_defaults(&input, &profile.profile.defaults),
            profile,
            policy,
            csr: None,
            metadata: Vec::new(),
            is_renewal: false,
        };
        self.dispatch(route, ctx, OffsetDateTime::now_utc()).await
    }

    /// 用配置文件绑定的内部CA签署外部 CSR
    pub async fn sign_from_profile(
        &self,
        profile_id: Uuid,
        csr_pem: &str,
        ttl: Ttl,
    ) -> Result<IssuanceResult> {
        let profile = self.load_profile(profile_id).await?;
        profile.profile.ensure_enrollment(EnrollmentType::Api)?;
        let policy = self.load_policy(&profile).await?;

        let ctx = IssuanceContext {
            request_id: None,
            project_id: profile.profile.project_id,
            profile,
            policy,
            input: CertificateRequestInput {
                validity: ValidityRequest::ttl(ttl),
                ..Default::default()
            },
            csr: Some(csr_pem.to_string()),
            metadata: Vec::new(),
            is_renewal: false,
        };
        self.dispatch(IssuanceRoute::CsrSigning, ctx, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn load_profile(&self, profile_id: Uuid) -> Result<ProfileWithConfigs> {
        self.deps
            .profiles
            .find_by_id_with_configs(profile_id)
            .await?
            .ok_or_else(|| PkiError::NotFound("Certificate profile not found".to_string()))
    }

    pub(crate) async fn load_policy(&self, profile: &ProfileWithConfigs) -> Result<Arc<CompiledPolicy>> {
        self.deps
            .policies
            .find_policy_by_id(profile.profile.policy_id)
            .await?
            .ok_or_else(|| {
                PkiError::NotFound("Certificate policy not found for this profile".to_string())
            })
    }

    pub(crate) async fn load_ca(&self, ca_id: Uuid) -> Result<CertificateAuthority> {
        self.deps
            .cas
            .find_ca_by_id(ca_id)
            .await?
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))
    }

    async fn dispatch(
        &self,
        route: IssuanceRoute,
        ctx: IssuanceContext,
        now: OffsetDateTime,
    ) -> Result<IssuanceResult> {
        tracing::debug!(
            request_id = ?ctx.request_id,
            profile_id = %ctx.profile.profile.id,
            %route,
            "dispatching certificate issuance"
        );

        if matches!(route, IssuanceRoute::SelfSigned | IssuanceRoute::InternalCa) {
            validate_request(&ctx.policy, &ctx.input, REQUEST_VALIDATION_CONTEXT, now)?;
        }

        let outcome = match route {
            IssuanceRoute::ExternalQueue => self.handle_external(&ctx).await?,
            IssuanceRoute::CsrSigning => self.handle_csr(&ctx, now).await?,
            IssuanceRoute::SelfSigned => self.handle_self_signed(&ctx, now)?,
            IssuanceRoute::InternalCa => self.handle_internal_ca(&ctx, now).await?,
        };

        match outcome {
            RouteOutcome::Queued => Ok(IssuanceResult::Pending {
                request_id: ctx.request_id,
            }),
            RouteOutcome::Issued(artifact) => {
                let (tx, issued) = self.stage(&ctx, artifact, now).await?;
                self.deps.certificates.commit(tx).await?;
                tracing::info!(
                    request_id = ?ctx.request_id,
                    certificate_id = %issued.certificate_id,
                    profile_id = %ctx.profile.profile.id,
                    %route,
                    "certificate issued"
                );
                Ok(IssuanceResult::Issued(Box::new(issued)))
            }
        }
    }

    pub(crate) async fn handle_external(&self, ctx: &IssuanceContext) -> Result<RouteOutcome> {
        let ca_id = ctx
            .profile
            .ca
            .as_ref()
            .map(|ca| ca.id)
            .ok_or_else(|| PkiError::NotFound("Certificate Authority not found".to_string()))?;

        self.deps
            .queue
            .enqueue(IssuanceJob {
                certificate_request_id: ctx.request_id,
                profile_id: ctx.profile.profile.id,
                ca_id,
                ttl: ctx.input.validity.ttl,
                signature_algorithm: ctx.input.signature_algorithm,
                key_algorithm: ctx.input.key_algorithm,
                subject: ctx.input.subject.clone(),
                subject_alt_names: ctx.input.sans().to_vec(),
                key_usages: ctx.input.key_usages().to_vec(),
                extended_key_usages: ctx.input.extended_key_usages().to_vec(),
                csr: ctx.csr.clone(),
                is_renewal: ctx.is_renewal,
                original_certificate_id: None,
            })
            .await?;
        Ok(RouteOutcome::Queued)
    }

    async fn handle_csr(&self, ctx: &IssuanceContext, now: OffsetDateTime) -> Result<RouteOutcome> {
        let csr_pem = ctx
            .csr
            .as_deref()
            .ok_or_else(|| PkiError::BadRequest("CSR is required for CSR signing".to_string()))?;
        let ca_id = ctx.profile.profile.ca_id.ok_or_else(|| {
            PkiError::BadRequest("Self-signed certificates are not supported for CSR signing".to_string())
        })?;
        let ca = self.load_ca(ca_id).await?;
        validate_ca_support(&ca, "CSR signing")?;

        let csr = Csr::from_pem(csr_pem)?;
        let algorithms = csr.algorithms()?;
        let mut input = csr.normalized_request()?.into_request_input(algorithms);
        input.validity = ctx.input.validity.clone();
        if input.validity.ttl.is_none() && !input.validity.has_explicit_dates() {
            input.validity.ttl = ctx.profile.profile.defaults.ttl;
        }

        validate_request(&ctx.policy, &input, REQUEST_VALIDATION_CONTEXT, now)?;
        validate_algorithm_compatibility(&ca, ctx.policy.policy())?;

        let (not_before, not_after) = resolve_validity(&input.validity, now)?;
        let issued = self
            .deps
            .signer
            .sign_cert_from_ca(SignFromCaParams {
                ca_id: ca.id,
                csr_pem: csr_pem.to_string(),
                not_before,
                not_after,
            })
            .await?;

        Ok(RouteOutcome::Issued(IssuedArtifact::from_ca(
            issued,
            ca.id,
            Some(algorithms.signature_algorithm),
            Some(algorithms.key_algorithm),
        )))
    }

    pub(crate) fn handle_self_signed(&self, ctx: &IssuanceContext, now: OffsetDateTime) -> Result<RouteOutcome> {
        let input = &ctx.input;
        let (signature_algorithm, key_algorithm) =
            effective_algorithms((input.signature_algorithm, input.key_algorithm), (None, None));

        let generated = generate_self_signed_at(
            input,
            Some(ctx.policy.policy()),
            signature_algorithm,
            key_algorithm,
            now,
        )?;

        let fallback = if ctx.is_renewal {
            "Renewed Self-signed Certificate"
        } else {
            "Self-signed Certificate"
        };
        let common_name = generated
            .subject
            .common_name
            .clone()
            .or_else(|| input.subject.common_name.clone())
            .unwrap_or_else(|| fallback.to_string());

        Ok(RouteOutcome::Issued(IssuedArtifact::from_self_signed(
            generated,
            common_name,
            input,
            signature_algorithm,
            key_algorithm,
        )))
    }

    pub(crate) async fn handle_internal_ca(&self, ctx: &IssuanceContext, now: OffsetDateTime) -> Result<RouteOutcome> {
        let ca_id = ctx
            .profile
            .profile
            .ca_id
            .ok_or_else(|| PkiError::NotFound("Certificate Authority ID not found".to_string()))?;
        let ca = self.load_ca(ca_id).await?;
        validate_ca_support(&ca, "direct certificate issuance")?;
        validate_algorithm_compatibility(&ca, ctx.policy.policy())?;

        let input = &ctx.input;
        let policy = Some(ctx.policy.policy());
        let (not_before, not_after) = resolve_validity(&input.validity, now)?;
        let (signature_algorithm, key_algorithm) =
            effective_algorithms((input.signature_algorithm, input.key_algorithm), (None, None));
        let constraints = input.basic_constraints.unwrap_or_default();

        let issued = self
            .deps
            .signer
            .issue_cert_from_ca(IssueFromCaParams {
                ca_id: ca.id,
                subject: build_certificate_subject(&input.subject, policy),
                sans: build_subject_alt_names(input.sans(), policy),
                key_usages: input.key_usages().to_vec(),
                extended_key_usages: input.extended_key_usages().to_vec(),
                not_before,
                not_after,
                signature_algorithm,
                key_algorithm,
                is_ca: constraints.is_ca,
                path_length: constraints.path_length,
            })
            .await?;

        Ok(RouteOutcome::Issued(IssuedArtifact::from_ca(
            issued,
            ca.id,
            Some(signature_algorithm),
            Some(key_algorithm),
        )))
    }

    /// 生成证书记录并收集事务操作，调用方可追加操作后提交
    pub(crate) async fn stage(
        &self,
        ctx: &IssuanceContext,
        artifact: IssuedArtifact,
        now: OffsetDateTime,
    ) -> Result<(TxContext, IssuedCertificate)> {
        let ttl_days = validity_days(artifact.not_before, artifact.not_after);
        let renew_before_days = RenewalConfig::from_api_config(ctx.profile.api_config.as_ref())
            .final_renew_before_days(ttl_days, artifact.not_after, now);

        let cert = Certificate {
            id: Uuid::new_v4(),
            project_id: ctx.project_id,
            profile_id: Some(ctx.profile.profile.id),
            ca_id: artifact.ca_id,
            pki_subscriber_id: None,
            serial_number: artifact.serial_number.clone(),
            common_name: artifact.common_name.clone(),
            alt_names: artifact.alt_names,
            key_usages: artifact.key_usages,
            extended_key_usages: artifact.extended_key_usages,
            signature_algorithm: artifact.signature_algorithm,
            key_algorithm: artifact.key_algorithm,
            not_before: artifact.not_before,
            not_after: artifact.not_after,
            status: CertificateStatus::Active,
            revoked_at: None,
            renew_before_days,
            renewed_by_certificate_id: None,
            renewed_from_certificate_id: None,
            renewal_error: None,
            metadata: Vec::new(),
        };
        let certificate_id = cert.id;

        let vault = &self.deps.vault;
        let body = EncryptedBody {
            encrypted_certificate: vault
                .encrypt(ctx.project_id, artifact.certificate_pem.as_bytes())
                .await?,
            encrypted_certificate_chain: vault
                .encrypt(ctx.project_id, artifact.certificate_chain_pem.as_bytes())
                .await?,
        };

        let mut tx = TxContext::new();
        tx.create_certificate(cert).push(TxOp::StoreBody {
            certificate_id,
            body,
        });
        if let Some(private_key) = &artifact.private_key_pem {
            tx.push(TxOp::StoreSecret {
                certificate_id,
                encrypted_private_key: vault.encrypt(ctx.project_id, private_key.as_bytes()).await?,
            });
        }
        if let Some(request_id) = ctx.request_id {
            tx.push(TxOp::MarkRequestIssued {
                request_id,
                certificate_id,
            });
        }
        if !ctx.metadata.is_empty() {
            tx.push(TxOp::CopyMetadata {
                certificate_id,
                metadata: ctx.metadata.clone(),
            });
        }

        let issued = IssuedCertificate {
            certificate_id,
            project_id: ctx.project_id,
            profile_slug: ctx.profile.profile.slug.clone(),
            serial_number: artifact.serial_number,
            common_name: artifact.common_name.unwrap_or_default(),
            certificate_pem: artifact.certificate_pem,
            certificate_chain_pem: artifact.certificate_chain_pem,
            issuing_ca_certificate_pem: artifact.issuing_ca_certificate_pem,
            private_key_pem: artifact.private_key_pem,
            not_before: artifact.not_before,
            not_after: artifact.not_after,
            renew_before_days,
        };
        Ok((tx, issued))
    }
}

/// 策略校验并检查策略要求的算法是否提供
pub(crate) fn validate_request(
    policy: &CompiledPolicy,
    input: &CertificateRequestInput,
    context: &str,
    now: OffsetDateTime,
) -> Result<()> {
    let warnings = PolicyValidator::validate_at(policy, input, now).into_result(context)?;
    for warning in warnings {
        tracing::warn!(policy_id = %policy.policy().id, %warning, "policy validation warning");
    }

    let algorithms = policy.policy().algorithms.as_ref();
    if algorithms.is_some_and(|alg| alg.key_algorithm.is_some()) && input.key_algorithm.is_none() {
        return Err(PkiError::BadRequest(
            "Key algorithm is required by policy but not provided in request".to_string(),
        ));
    }
    if algorithms.is_some_and(|alg| alg.signature.is_some()) && input.signature_algorithm.is_none() {
        return Err(PkiError::BadRequest(
            "Signature algorithm is required by policy but not provided in request".to_string(),
        ));
    }
    Ok(())
}
