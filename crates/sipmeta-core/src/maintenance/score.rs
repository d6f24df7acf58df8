//! Metadata completeness score (0-100)

use crate::fetcher::Placeholders;
use crate::models::TokenCacheData;

const NAME: u8 = 20;
const SYMBOL: u8 = 20;
const DECIMALS: u8 = 10;
const IDENTIFIER: u8 = 15;
const DESCRIPTION: u8 = 10;
const IMAGE: u8 = 15;
const TOTAL_SUPPLY: u8 = 10;

/// Weighted presence of each field; generated description/image earn nothing
pub fn completeness_score(data: &TokenCacheData, placeholders: &Placeholders) -> u8 {
    let present = |s: &str| !s.trim().is_empty();
    let mut score = 0;

    if present(&data.name) {
        score += NAME;
    }
    if present(&data.symbol) {
        score += SYMBOL;
    }
    // decimals is always set on a merged record
    score += DECIMALS;
    if data.identifier.as_deref().is_some_and(present) {
        score += IDENTIFIER;
    }
    if data.description.as_deref().is_some_and(present) && !placeholders.is_placeholder_description(data) {
        score += DESCRIPTION;
    }
    if data
        .image
        .as_deref()
        .is_some_and(|img| present(img) && !placeholders.is_placeholder_image(img))
    {
        score += IMAGE;
    }
    if data.total_supply.is_some() {
        score += TOTAL_SUPPLY;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractId, PartialMetadata, TokenSupply};

    fn placeholders() -> Placeholders {
        Placeholders::new("https://placehold.co/400x400?text=")
    }

    #[test]
    fn test_full_record_scores_100() {
        let mut data = TokenCacheData::native_stx();
        data.total_supply = Some(TokenSupply(1));
        assert_eq!(completeness_score(&data, &placeholders()), 100);
    }

    #[test]
    fn test_weights() {
        let mut data = TokenCacheData::native_stx();
        data.total_supply = Some(TokenSupply(1));

        data.identifier = None;
        assert_eq!(completeness_score(&data, &placeholders()), 85);
        data.image = None;
        assert_eq!(completeness_score(&data, &placeholders()), 70);
        data.total_supply = None;
        assert_eq!(completeness_score(&data, &placeholders()), 60);
        data.description = Some("   ".into());
        assert_eq!(completeness_score(&data, &placeholders()), 50);
    }

    #[test]
    fn test_placeholders_earn_no_credit() {
        let id = ContractId::parse("SP2ZNGJ85ENDY6QRHQ5P2D4FXKGZWCKTB2T0Z55KS.my-token").unwrap();
        let data = placeholders().apply(
            &id,
            PartialMetadata {
                symbol: Some("MYT".into()),
                ..Default::default()
            },
        );
        // name + symbol + decimals only
        assert_eq!(completeness_score(&data, &placeholders()), 50);
    }
}
