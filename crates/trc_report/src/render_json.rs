//! JSON rendering: the model's struct layout already fixes field order, so
//! this is a thin `serde_json` wrapper, not a bespoke builder.

use crate::model::ReportModel;
use crate::ReportError;

pub fn render_json(model: &ReportModel) -> Result<String, ReportError> {
    serde_json::to_string_pretty(model).map_err(|e| ReportError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StatusTotals;

    #[test]
    fn renders_empty_model_as_json_object() {
        let model = ReportModel {
            totals: StatusTotals::default(),
            packages: Vec::new(),
            keys: Vec::new(),
            details: Vec::new(),
        };
        let json = render_json(&model).unwrap();
        assert!(json.contains("\"totals\""));
        assert!(json.contains("\"packages\""));
    }
}
