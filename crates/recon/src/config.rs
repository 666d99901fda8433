use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine rules: column naming for both upload flows and the batch policies.
///
/// Every section is optional; an empty TOML document yields the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReconConfig {
    #[serde(default)]
    pub columns: AddColumns,
    #[serde(default)]
    pub as_of: AsOfColumns,
    #[serde(default)]
    pub policy: PolicyConfig,
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Header names of the add-flow upload.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AddColumns {
    pub order_number: String,
    pub material_number: String,
    pub sales_document: String,
    pub order_date: String,
    pub batch_number: String,
    pub year: String,
    pub club_name: String,
    pub order_type: String,
    pub status: String,
    pub cdd: String,
    pub ship_out_date: String,
    pub tracking_number: String,
    pub created_by: String,
}

impl Default for AddColumns {
    fn default() -> Self {
        Self {
            order_number: "ORDERNUMBER".into(),
            material_number: "MATERIAL_NUMBER".into(),
            sales_document: "SALES_DOCUMENT".into(),
            order_date: "ORDER_DATE".into(),
            batch_number: "BATCHNUMBER".into(),
            year: "YEAR".into(),
            club_name: "CLUB_NAME".into(),
            order_type: "ORDER_TYPE".into(),
            status: "STATUS".into(),
            cdd: "CDD".into(),
            ship_out_date: "SHIP_OUT_DATE".into(),
            tracking_number: "TRACKING_NUMBER".into(),
            created_by: "CREATED_BY".into(),
        }
    }
}

impl AddColumns {
    /// All headers in record field order (matches `ReconciliationRecord::to_cells`).
    pub fn headers(&self) -> Vec<&str> {
        vec![
            self.order_number.as_str(),
            self.material_number.as_str(),
            self.sales_document.as_str(),
            self.order_date.as_str(),
            self.batch_number.as_str(),
            self.year.as_str(),
            self.club_name.as_str(),
            self.order_type.as_str(),
            self.status.as_str(),
            self.cdd.as_str(),
            self.ship_out_date.as_str(),
            self.tracking_number.as_str(),
            self.created_by.as_str(),
        ]
    }
}

/// Header names of the as-of upload. These differ from the add flow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AsOfColumns {
    pub order_number: String,
    pub material_number: String,
    pub batch_number: String,
}

impl Default for AsOfColumns {
    fn default() -> Self {
        Self {
            order_number: "Order ID".into(),
            material_number: "Material".into(),
            batch_number: "BATCHNUMBER".into(),
        }
    }
}

impl AsOfColumns {
    /// The identity columns. A missing batch column reads as a blank batch.
    pub fn required(&self) -> Vec<String> {
        vec![self.order_number.clone(), self.material_number.clone()]
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How the committer applies a validated batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// One commit per record; a failure keeps earlier rows.
    #[default]
    RowByRow,
    /// One transaction for the batch; a failure rolls everything back.
    SingleTransaction,
}

impl std::fmt::Display for CommitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RowByRow => write!(f, "row_by_row"),
            Self::SingleTransaction => write!(f, "single_transaction"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub commit: CommitPolicy,
    /// Also reject batches whose own rows share an identity.
    pub in_batch_duplicates: bool,
    /// `created_by` for rows that leave it blank.
    pub default_created_by: String,
    /// Columns the first row must carry. `None` means every add-flow column
    /// except `created_by`.
    pub required_columns: Option<Vec<String>>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            commit: CommitPolicy::RowByRow,
            in_batch_duplicates: true,
            default_created_by: "system".into(),
            required_columns: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let mut seen = HashSet::new();
        for header in self.columns.headers() {
            if header.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "column names must not be empty".into(),
                ));
            }
            if !seen.insert(header) {
                return Err(ReconError::ConfigValidation(format!(
                    "column '{header}' is mapped to more than one field"
                )));
            }
        }

        let as_of = &self.as_of;
        if [&as_of.order_number, &as_of.material_number, &as_of.batch_number]
            .iter()
            .any(|c| c.trim().is_empty())
        {
            return Err(ReconError::ConfigValidation(
                "as_of column names must not be empty".into(),
            ));
        }
        if as_of.order_number == as_of.material_number {
            return Err(ReconError::ConfigValidation(
                "as_of order and material columns must differ".into(),
            ));
        }

        if self.policy.default_created_by.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "default_created_by must not be empty".into(),
            ));
        }

        if let Some(ref required) = self.policy.required_columns {
            if !required.iter().any(|c| *c == self.columns.order_number) {
                return Err(ReconError::ConfigValidation(format!(
                    "required_columns must include the order number column '{}'",
                    self.columns.order_number
                )));
            }
        }

        Ok(())
    }

    /// Columns whose absence from the first row rejects an add-flow batch.
    pub fn required_columns(&self) -> Vec<String> {
        match self.policy.required_columns {
            Some(ref cols) => cols.clone(),
            None => self
                .columns
                .headers()
                .into_iter()
                .filter(|h| *h != self.columns.created_by)
                .map(str::to_string)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
