//! The individual maintenance jobs

use super::report::{ItemOutcome, JobReport};
use super::{completeness_score, MaintenanceRunner};
use crate::error::{MetadataError, Result};
use crate::models::{ContractId, TokenCacheData};
use crate::service::RefreshOutcome;
use crate::store::token_key;
use serde_json::Value;
use tracing::{debug, warn};

impl MaintenanceRunner {
    pub(super) async fn audit(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.cached_ids().await?;
        self.in_batches(ids, report, false, |id| async move {
            match self.service.cached(&id).await {
                Some(data) => ItemOutcome::Scored(completeness_score(&data, &self.placeholders)),
                None => ItemOutcome::Failed("record missing or unreadable".to_string()),
            }
        })
        .await;
        Ok(())
    }

    pub(super) async fn fix_identifiers(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.cached_ids().await?;
        self.in_batches(ids, report, true, |id| self.fix_identifier(id))
            .await;
        Ok(())
    }

    pub(super) async fn convert_supply(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.cached_ids().await?;
        self.in_batches(ids, report, false, |id| self.convert_one_supply(id))
            .await;
        Ok(())
    }

    pub(super) async fn audit_images(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.cached_ids().await?;
        self.in_batches(ids, report, true, |id| self.audit_image(id))
            .await;
        Ok(())
    }

    pub(super) async fn refresh_incomplete(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.cached_ids().await?;
        self.in_batches(ids, report, true, |id| async move {
            let Some(data) = self.service.cached(&id).await else {
                return ItemOutcome::Failed("record missing or unreadable".to_string());
            };
            let score = completeness_score(&data, &self.placeholders);
            if score >= self.options.score_threshold {
                return ItemOutcome::Unchanged;
            }
            debug!(contract_id = %id, score, "Below threshold");
            self.refresh_item(&id).await
        })
        .await;
        Ok(())
    }

    pub(super) async fn refresh_managed(&self, report: &mut JobReport) -> Result<()> {
        let ids = self.service.registry().managed().await?;
        self.in_batches(ids, report, true, |id| async move { self.refresh_item(&id).await })
            .await;
        Ok(())
    }

    async fn fix_identifier(&self, id: ContractId) -> ItemOutcome {
        let Some(mut data) = self.service.cached(&id).await else {
            return ItemOutcome::Failed("record missing or unreadable".to_string());
        };
        if data.identifier.is_some() || id.is_native() {
            return ItemOutcome::Unchanged;
        }

        match self.chain.identifier(&id).await {
            Ok(Some(identifier)) => {
                if self.options.mode.is_live() {
                    data.identifier = Some(identifier);
                    if let Err(e) = self.service.put(&data).await {
                        return ItemOutcome::Failed(e.to_string());
                    }
                }
                ItemOutcome::Changed
            }
            Ok(None) => ItemOutcome::Failed("contract declares no fungible token".to_string()),
            Err(e) => ItemOutcome::Failed(e.to_string()),
        }
    }

    /// Legacy records stored `total_supply` as a JSON number
    async fn convert_one_supply(&self, id: ContractId) -> ItemOutcome {
        let raw = match self.store.get(&token_key(id.as_str())).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ItemOutcome::Failed("record missing".to_string()),
            Err(e) => return ItemOutcome::Failed(e.to_string()),
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => return ItemOutcome::Failed(format!("invalid JSON: {}", e)),
        };
        if !value.get("total_supply").is_some_and(Value::is_number) {
            return ItemOutcome::Unchanged;
        }
        if !self.options.mode.is_live() {
            return ItemOutcome::Changed;
        }

        let data: TokenCacheData = match serde_json::from_value(value) {
            Ok(data) => data,
            Err(e) => return ItemOutcome::Failed(format!("cannot decode record: {}", e)),
        };
        match self.service.put(&data).await {
            Ok(()) => ItemOutcome::Changed,
            Err(e) => ItemOutcome::Failed(e.to_string()),
        }
    }

    async fn audit_image(&self, id: ContractId) -> ItemOutcome {
        let Some(data) = self.service.cached(&id).await else {
            return ItemOutcome::Failed("record missing or unreadable".to_string());
        };

        let problem = match data.image.as_deref().map(str::trim) {
            None | Some("") => Some("missing image".to_string()),
            Some(image) if self.placeholders.is_placeholder_image(image) => {
                Some("placeholder image".to_string())
            }
            Some(image) => match self.probe.status(image).await {
                Ok(status) if (200..300).contains(&status) => None,
                Ok(status) => Some(format!("image returned HTTP {}", status)),
                Err(e) => Some(format!("image unreachable: {}", e)),
            },
        };

        match problem {
            None => ItemOutcome::Unchanged,
            Some(problem) => {
                debug!(contract_id = %id, problem = %problem, "Image needs attention");
                self.refresh_item(&id).await
            }
        }
    }

    /// Force-refresh in live mode; report what would happen in dry-run
    async fn refresh_item(&self, id: &ContractId) -> ItemOutcome {
        match self.service.registry().is_blacklisted(id).await {
            Ok(true) => return ItemOutcome::Skipped,
            Ok(false) => {}
            Err(e) => return ItemOutcome::Failed(e.to_string()),
        }
        if !self.options.mode.is_live() {
            return ItemOutcome::Changed;
        }

        match self.service.refresh(id).await {
            Ok(RefreshOutcome::Fresh(_)) => ItemOutcome::Changed,
            Ok(RefreshOutcome::Stale(_)) => {
                ItemOutcome::Failed("refresh failed, stale record kept".to_string())
            }
            Ok(RefreshOutcome::Missing) => ItemOutcome::Failed("no metadata found".to_string()),
            Err(MetadataError::Blacklisted { .. }) => ItemOutcome::Skipped,
            Err(e) => {
                warn!(contract_id = %id, error = %e, "Refresh failed");
                ItemOutcome::Failed(e.to_string())
            }
        }
    }
}
