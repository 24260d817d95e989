use anyhow::{Result, anyhow};
use bvo_core::summary::{ActionsFile, markdown_section};
use bvo_core::{Blueprint, ProvisionReportBuilder, ReportMode, ServiceSpec};
use bvo_jfrog::JfrogClient;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::commands::github::mirror_services;
use crate::commands::provision::summary_lines;
use crate::context::OpsContext;
use crate::exit::Exit;

/// PEM encoded evidence signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    pub private_pem: String,
    pub public_pem: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

/// Generates an RSA key pair off the async runtime.
pub async fn generate_key_pair(bits: usize) -> Result<KeyPair> {
    tokio::task::spawn_blocking(move || {
        let mut rng = rsa::rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits).map_err(|err| anyhow!("key generation failed: {err}"))?;
        let public = RsaPublicKey::from(&private);
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| anyhow!("private key encoding failed: {err}"))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| anyhow!("public key encoding failed: {err}"))?;
        Ok(KeyPair {
            private_pem: private_pem.as_str().to_owned(),
            public_pem,
        })
    })
    .await?
}

/// Uploads a fresh public key under the blueprint alias unless the alias is
/// already trusted. Returns the generated pair so the private half can be
/// mirrored.
pub async fn ensure_evidence_key(
    client: &JfrogClient,
    blueprint: &Blueprint,
    report: &mut ProvisionReportBuilder,
) -> Option<KeyPair> {
    let alias = blueprint.evidence.key_alias.as_str();
    let entry = format!("trusted-key:{alias}");
    match client.list_trusted_keys().await {
        Ok(keys) if keys.iter().any(|key| key.alias == alias) => {
            tracing::info!("✅ {entry} already exists");
            report.skipped(entry);
            return None;
        }
        Ok(_) => {}
        Err(err) => {
            tracing::error!("❌ {entry}: {err}");
            report.failed(format!("{entry}: {err}"));
            return None;
        }
    }
    if report.mode().is_plan() {
        report.created(entry);
        return None;
    }

    let pair = match generate_key_pair(blueprint.evidence.key_bits).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!("❌ {entry}: {err}");
            report.failed(format!("{entry}: {err:#}"));
            return None;
        }
    };
    match client.upload_trusted_key(alias, &pair.public_pem).await {
        Ok(response) => {
            let outcome = response.outcome();
            report.record("trusted-key", alias, &outcome);
            outcome.is_success().then_some(pair)
        }
        Err(err) => {
            report.failed(format!("{entry}: {err}"));
            None
        }
    }
}

pub async fn run(ctx: &OpsContext, skip_github: bool) -> Result<Exit> {
    let client = ctx.client()?;
    let mut report = ProvisionReportBuilder::new(ctx.project(), ReportMode::Ensure);
    let pair = ensure_evidence_key(&client, &ctx.blueprint, &mut report).await;

    if !skip_github {
        if pair.is_none() {
            tracing::warn!("⚠️ no new key generated; only the alias is mirrored");
        }
        let gh = ctx.gh();
        let mirror = ctx.mirror(&gh)?;
        let services: Vec<&ServiceSpec> = ctx.blueprint.services.iter().collect();
        let private_key = pair.as_ref().map(|p| p.private_pem.as_str());
        mirror_services(&mirror, &ctx.blueprint, &services, private_key, &mut report).await;
    }

    let report = report.finish();
    ActionsFile::step_summary().append(&markdown_section("Evidence key", &summary_lines(&report)))?;
    ctx.emit(&report)?;
    Ok(Exit::failed_if(report.has_failures()))
}
