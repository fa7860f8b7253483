//! Accepted shapes of the list-accounts response and their normalisation.

use crate::models::RemoteAccount;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Body returned by the list-accounts collaborator.
///
/// Only these shapes are accepted; anything else fails to decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountListing {
    Bare(Vec<Value>),
    Accounts { accounts: Vec<Value> },
    Results { results: Vec<Value> },
    Data { data: Vec<Value> },
}

/// One listing entry before validation. Ids may arrive as strings or numbers.
#[derive(Debug, Deserialize)]
struct RawAccount {
    #[serde(
        default,
        rename = "accountRef",
        alias = "account_ref",
        alias = "pluggy_account_id",
        deserialize_with = "lenient_id"
    )]
    account_ref: Option<String>,
    #[serde(
        default,
        rename = "tenantId",
        alias = "tenant_id",
        alias = "company_id",
        deserialize_with = "lenient_id"
    )]
    tenant_id: Option<String>,
    #[serde(
        default,
        rename = "ownerRef",
        alias = "owner_ref",
        alias = "item_id",
        alias = "pluggy_item_id",
        deserialize_with = "lenient_id"
    )]
    owner_ref: Option<String>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl AccountListing {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn entries(&self) -> &[Value] {
        match self {
            AccountListing::Bare(entries)
            | AccountListing::Accounts { accounts: entries }
            | AccountListing::Results { results: entries }
            | AccountListing::Data { data: entries } => entries,
        }
    }

    fn into_entries(self) -> Vec<Value> {
        match self {
            AccountListing::Bare(entries)
            | AccountListing::Accounts { accounts: entries }
            | AccountListing::Results { results: entries }
            | AccountListing::Data { data: entries } => entries,
        }
    }

    /// Keep the entries that can be reconciled, in listing order.
    ///
    /// Entries without an account reference are dropped, as are entries
    /// without an owner reference when `require_owner_ref` is set and entries
    /// that name a tenant other than `tenant_id`. Every kept account belongs
    /// to `tenant_id`.
    pub fn into_accounts(self, tenant_id: &str, require_owner_ref: bool) -> Vec<RemoteAccount> {
        self.into_entries()
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|entry| serde_json::from_value::<RawAccount>(entry).ok())
            .filter_map(|raw| {
                let account_ref = raw.account_ref?;
                if require_owner_ref && raw.owner_ref.is_none() {
                    return None;
                }
                if raw.tenant_id.as_deref().is_some_and(|t| t != tenant_id) {
                    tracing::debug!(
                        account_ref = %account_ref,
                        "Dropping listed account owned by another tenant"
                    );
                    return None;
                }
                Some(RemoteAccount {
                    account_ref,
                    tenant_id: tenant_id.to_string(),
                    owner_ref: raw.owner_ref,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> AccountListing {
        serde_json::from_value(value).expect("listing should decode")
    }

    #[test]
    fn test_accepts_bare_array() {
        let listing = parse(json!([{"accountRef": "a1", "ownerRef": "i1"}]));
        assert!(matches!(listing, AccountListing::Bare(_)));
        assert_eq!(listing.into_accounts("T1", true).len(), 1);
    }

    #[test]
    fn test_accepts_wrapped_shapes() {
        for key in ["accounts", "results", "data"] {
            let listing = parse(json!({ key: [{"accountRef": "a1", "ownerRef": "i1"}], "total": 1 }));
            assert_eq!(listing.entries().len(), 1, "key {key}");
        }
    }

    #[test]
    fn test_rejects_unknown_shape() {
        let result = serde_json::from_value::<AccountListing>(json!({"error": "nope"}));
        assert!(result.is_err());
        assert!(AccountListing::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_legacy_field_names_and_numeric_ids() {
        let accounts = parse(json!({"accounts": [
            {"pluggy_account_id": "acc-9", "company_id": 42, "item_id": 7}
        ]}))
        .into_accounts("42", true);

        assert_eq!(
            accounts,
            vec![RemoteAccount {
                account_ref: "acc-9".into(),
                tenant_id: "42".into(),
                owner_ref: Some("7".into()),
            }]
        );
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let accounts = parse(json!([
            {"accountRef": "a1", "ownerRef": "i1"},
            {"ownerRef": "i2"},
            {"accountRef": "", "ownerRef": "i3"},
            {"accountRef": "a4"},
            "garbage",
            null,
            {"accountRef": "a5", "ownerRef": "i5"}
        ]))
        .into_accounts("T1", true);

        let refs: Vec<_> = accounts.iter().map(|a| a.account_ref.as_str()).collect();
        assert_eq!(refs, vec!["a1", "a5"]);
        assert!(accounts.iter().all(|a| a.tenant_id == "T1"));
    }

    #[test]
    fn test_accounts_of_other_tenants_are_dropped() {
        let accounts = parse(json!([
            {"accountRef": "mine", "ownerRef": "i1"},
            {"accountRef": "theirs", "company_id": "T2", "ownerRef": "i2"},
            {"accountRef": "tagged", "tenantId": "T1", "ownerRef": "i3"}
        ]))
        .into_accounts("T1", true);

        let refs: Vec<_> = accounts.iter().map(|a| a.account_ref.as_str()).collect();
        assert_eq!(refs, vec!["mine", "tagged"]);
        assert!(accounts.iter().all(|a| a.tenant_id == "T1"));
    }

    #[test]
    fn test_owner_ref_optional_when_not_required() {
        let accounts = parse(json!([{"accountRef": "a4"}])).into_accounts("T1", false);
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].owner_ref, None);
    }
}
