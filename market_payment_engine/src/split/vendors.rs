use std::{collections::HashMap, path::Path};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{db_types::VendorId, split::VendorRegistryError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    /// The gateway's transfer recipient code, used when paying the vendor out directly.
    #[serde(default)]
    pub recipient_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub name: String,
    pub subaccount_id: String,
    #[serde(default)]
    pub bank_details: BankDetails,
}

impl Vendor {
    pub fn new(name: &str, subaccount_id: &str) -> Self {
        Self { name: name.to_string(), subaccount_id: subaccount_id.to_string(), bank_details: BankDetails::default() }
    }

    pub fn with_recipient_code(mut self, code: &str) -> Self {
        self.bank_details.recipient_code = Some(code.to_string());
        self
    }
}

/// Static vendor reference data, keyed by vendor id.
///
/// The JSON representation is an object mapping vendor ids to vendors:
/// ```json
/// { "mama-put": { "name": "Mama Put Kitchen", "subaccountId": "ACCT_8f4s1eq7ml6rlzj", "bankDetails": {} } }
/// ```
#[derive(Debug, Clone, Default)]
pub struct VendorRegistry {
    vendors: HashMap<VendorId, Vendor>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, VendorRegistryError> {
        let vendors: HashMap<VendorId, Vendor> = serde_json::from_str(json)?;
        if let Some((id, _)) = vendors.iter().find(|(_, v)| v.subaccount_id.trim().is_empty()) {
            return Err(VendorRegistryError::MissingSubaccount(id.clone()));
        }
        Ok(Self { vendors })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, VendorRegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json_str(&json)?;
        info!("🧮️ Loaded {} vendors from {}", registry.len(), path.display());
        Ok(registry)
    }

    pub fn with_vendor<V: Into<VendorId>>(mut self, id: V, vendor: Vendor) -> Self {
        self.insert(id, vendor);
        self
    }

    pub fn insert<V: Into<VendorId>>(&mut self, id: V, vendor: Vendor) -> Option<Vendor> {
        self.vendors.insert(id.into(), vendor)
    }

    pub fn get(&self, id: &VendorId) -> Option<&Vendor> {
        self.vendors.get(id)
    }

    pub fn contains(&self, id: &VendorId) -> bool {
        self.vendors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VendorId, &Vendor)> {
        self.vendors.iter()
    }
}
