//! Procedure code catalog

/// Friendly names for the procedure codes members are most often referred for
const CATALOG: &[(&str, &str)] = &[
    ("73721", "MRI of the Knee"),
    ("80050", "General Health Panel"),
    ("85025", "Complete Blood Count"),
    ("80053", "Comprehensive Metabolic Panel"),
    ("80061", "Lipid Panel"),
    ("80048", "Basic Metabolic Panel"),
    ("70450", "CT Head"),
    ("71045", "X-Ray Chest"),
    ("72148", "MRI Lumbar Spine"),
    ("74177", "CT Abdomen/Pelvis"),
];

/// Member-facing description; unknown codes render as `Service <code>`
pub fn describe(cpt_code: &str) -> String {
    let code = cpt_code.trim();
    CATALOG
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Service {}", code))
}

/// Radiology codes occupy the 70000 range
pub fn is_imaging(cpt_code: &str) -> bool {
    cpt_code.trim().starts_with('7')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_known_and_unknown() {
        assert_eq!(describe("73721"), "MRI of the Knee");
        assert_eq!(describe(" 85025 "), "Complete Blood Count");
        assert_eq!(describe("99213"), "Service 99213");
    }

    #[test]
    fn test_imaging_prefix() {
        assert!(is_imaging("73721"));
        assert!(is_imaging("70450"));
        assert!(!is_imaging("80053"));
        assert!(!is_imaging(""));
    }
}
