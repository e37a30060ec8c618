//! Lenient numeric conversions: anything that is not a clean number becomes `None`.

fn present(val: Option<&str>) -> Option<&str> {
    match val {
        None | Some("") | Some("-") => None,
        Some(v) => Some(v),
    }
}

pub fn to_int(val: Option<&str>) -> Option<i64> {
    present(val)?.parse().ok()
}

/// `nan` and `inf` spellings parse as floats but are not usable measurements.
pub fn to_float(val: Option<&str>) -> Option<f64> {
    present(val)?.parse::<f64>().ok().filter(|v| v.is_finite())
}
