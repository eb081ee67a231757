//! Detector model resolution and gamma dose calibration.

use crate::domain::models::DeviceModel;

/// CPM per µSv/h, keyed by model short code. Calibrated against Cs-137.
pub const CALIBRATION_TABLE: &[(&str, f64)] = &[
    ("F", 163.0),
    ("N", 1111.0),
    ("M", 33000.0),
    ("P", 348.0),
];

/// Resolve the model from an advertised name of the form `<prefix>-<letter>-<digits>`,
/// e.g. `CT-F-54` gives full `CT-F` and short `F`.
pub fn resolve_model(advertised_name: &str) -> DeviceModel {
    let mut parts = advertised_name.trim().split('-');
    let (Some(prefix), Some(letter), Some(digits), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return DeviceModel::default();
    };

    let prefix_ok = !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric());
    let letter_ok = letter.len() == 1 && letter.chars().all(|c| c.is_ascii_alphabetic());
    let digits_ok = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());

    if !(prefix_ok && letter_ok && digits_ok) {
        return DeviceModel::default();
    }

    let short = letter.to_ascii_uppercase();
    DeviceModel {
        full: Some(format!("{}-{}", prefix, short)),
        short: Some(short),
    }
}

/// Divisor for the model, or `None` when unresolved or not in the table.
pub fn calibration_factor(model: &DeviceModel) -> Option<f64> {
    let short = model.short.as_deref()?;
    CALIBRATION_TABLE
        .iter()
        .find(|(code, _)| *code == short)
        .map(|(_, factor)| *factor)
}

/// `cpm / factor` when a factor exists, otherwise absent.
pub fn dose_rate(cpm: f64, factor: Option<f64>) -> Option<f64> {
    factor.map(|f| cpm / f)
}
