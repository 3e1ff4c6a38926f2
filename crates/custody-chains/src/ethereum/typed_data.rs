//! EIP-712 structured data hashing

use std::collections::{BTreeMap, HashSet};

use alloy_dyn_abi::TypedData;
use alloy_primitives::B256;
use alloy_sol_types::Eip712Domain;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ChainError, Result};

const DOMAIN_TYPE: &str = "EIP712Domain";

/// One member of an EIP-712 struct type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedDataField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl TypedDataField {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// A complete EIP-712 payload as wallets exchange it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedDataRequest {
    pub domain: Eip712Domain,
    pub types: BTreeMap<String, Vec<TypedDataField>>,
    #[serde(alias = "message")]
    pub value: serde_json::Value,
}

impl TypedDataRequest {
    pub fn signing_hash(&self) -> Result<B256> {
        typed_data_hash(&self.domain, &self.types, &self.value)
    }
}

/// The struct no other struct refers to
///
/// `EIP712Domain` is never a candidate. Zero or several candidates is an
/// error.
pub fn primary_type(types: &BTreeMap<String, Vec<TypedDataField>>) -> Result<String> {
    let referenced: HashSet<&str> = types
        .values()
        .flatten()
        .map(|field| base_type(&field.ty))
        .collect();

    let candidates: Vec<&String> = types
        .keys()
        .filter(|name| name.as_str() != DOMAIN_TYPE && !referenced.contains(name.as_str()))
        .collect();

    match candidates.as_slice() {
        [primary] => Ok((*primary).clone()),
        [] => Err(ChainError::TypedData("no primary type found".into())),
        many => Err(ChainError::TypedData(format!(
            "ambiguous primary type: {}",
            many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// `Person[2][]` -> `Person`
fn base_type(ty: &str) -> &str {
    ty.split('[').next().unwrap_or(ty)
}

/// `keccak256(0x1901 || domainSeparator || hashStruct(message))`
pub fn typed_data_hash(
    domain: &Eip712Domain,
    types: &BTreeMap<String, Vec<TypedDataField>>,
    value: &serde_json::Value,
) -> Result<B256> {
    let mut types = types.clone();
    types.remove(DOMAIN_TYPE);
    let primary = primary_type(&types)?;

    let mut typed: TypedData = serde_json::from_value(json!({
        "types": types,
        "primaryType": primary,
        "domain": {},
        "message": value,
    }))?;
    typed.domain = domain.clone();

    typed
        .eip712_signing_hash()
        .map_err(|e| ChainError::TypedData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::eip712_domain;

    fn mail_types() -> BTreeMap<String, Vec<TypedDataField>> {
        BTreeMap::from([
            (
                "Person".to_string(),
                vec![
                    TypedDataField::new("name", "string"),
                    TypedDataField::new("wallet", "address"),
                ],
            ),
            (
                "Mail".to_string(),
                vec![
                    TypedDataField::new("from", "Person"),
                    TypedDataField::new("to", "Person"),
                    TypedDataField::new("contents", "string"),
                ],
            ),
        ])
    }

    fn mail_value() -> serde_json::Value {
        json!({
            "from": { "name": "Cow", "wallet": "0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826" },
            "to": { "name": "Bob", "wallet": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" },
            "contents": "Hello, Bob!"
        })
    }

    #[test]
    fn test_primary_type_inference() {
        assert_eq!(primary_type(&mail_types()).unwrap(), "Mail");

        let mut with_domain = mail_types();
        with_domain.insert(
            DOMAIN_TYPE.to_string(),
            vec![TypedDataField::new("name", "string")],
        );
        assert_eq!(primary_type(&with_domain).unwrap(), "Mail");
    }

    #[test]
    fn test_array_references_count() {
        let types = BTreeMap::from([
            ("Item".to_string(), vec![TypedDataField::new("id", "uint256")]),
            ("Order".to_string(), vec![TypedDataField::new("items", "Item[]")]),
        ]);
        assert_eq!(primary_type(&types).unwrap(), "Order");
    }

    #[test]
    fn test_ambiguous_primary_type() {
        let types = BTreeMap::from([
            ("A".to_string(), vec![TypedDataField::new("x", "uint256")]),
            ("B".to_string(), vec![TypedDataField::new("y", "uint256")]),
        ]);
        assert!(matches!(primary_type(&types), Err(ChainError::TypedData(_))));
    }

    #[test]
    fn test_mail_example_hash() {
        let domain = eip712_domain! {
            name: "Ether Mail",
            version: "1",
            chain_id: 1,
            verifying_contract: address!("cccccccccccccccccccccccccccccccccccccccc"),
        };

        let hash = typed_data_hash(&domain, &mail_types(), &mail_value()).unwrap();
        assert_eq!(
            hex::encode(hash),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_request_accepts_message_key() {
        let request: TypedDataRequest = serde_json::from_value(json!({
            "domain": { "name": "Ether Mail", "version": "1" },
            "types": mail_types(),
            "primaryType": "Mail",
            "message": mail_value(),
        }))
        .unwrap();

        assert_eq!(request.value, mail_value());
        assert!(request.types.contains_key("Person"));
        request.signing_hash().unwrap();
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        let domain = eip712_domain! { name: "Test Domain", version: "1", chain_id: 1, };
        let value = json!({ "from": "not a person" });
        assert!(typed_data_hash(&domain, &mail_types(), &value).is_err());
    }
}
