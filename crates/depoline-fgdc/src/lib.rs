//! depoline-fgdc: FGDC CSDGM XML records to Zenodo deposition payloads

pub mod crosswalk;
pub mod parser;

use std::path::Path;

use chrono::Datelike;
use depoline_core::{TransformError, Transformed, Transformer};

pub use crosswalk::{CrosswalkOptions, crosswalk, normalize_date};
pub use parser::{FgdcRecord, parse_fgdc};

pub struct FgdcTransformer {
    options: CrosswalkOptions,
}

impl FgdcTransformer {
    pub fn new(options: CrosswalkOptions) -> Self {
        Self { options }
    }
}

impl Transformer for FgdcTransformer {
    fn source_pattern(&self) -> &str {
        "**/*.xml"
    }

    fn transform(&self, source: &Path) -> Result<Transformed, TransformError> {
        let xml = std::fs::read_to_string(source)?;
        let record = parse_fgdc(&xml)?;
        crosswalk(&record, &self.options, chrono::Local::now().year())
    }
}
