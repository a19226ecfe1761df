pub(crate) fn to_u16(a: u8, b: u8) -> u16 {
    ((a as u16) << 8) + (b as u16)
}

pub(crate) fn degree_to_radian(degree: f64) -> f64 {
    degree * std::f64::consts::PI / 180.
}

/// Converts the legacy q6 angle field (check bit in bit 0) into q14 form.
pub(crate) fn q6_to_q14(angle_q6_checkbit: u16) -> u16 {
    let angle_q6 = (angle_q6_checkbit >> 1) as u32;
    ((angle_q6 << 8) / 90) as u16
}

pub(crate) fn to_string(data: &[u8]) -> String {
    data.iter()
        .map(|e| format!("{:02X}", e))
        .collect::<Vec<_>>()
        .join(" ")
}
