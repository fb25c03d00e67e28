use rand::Rng;

pub const TRACKING_CODE_LEN: usize = 12;
const TRACKING_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Uniformly random code over `[A-Z0-9]`.
pub fn generate_tracking_code() -> String {
    let mut rng = rand::rng();
    (0..TRACKING_CODE_LEN)
        .map(|_| TRACKING_CODE_CHARSET[rng.random_range(0..TRACKING_CODE_CHARSET.len())] as char)
        .collect()
}

/// Canonical form of a user-supplied code, or `None` if it cannot be one of ours.
pub fn normalize_tracking_code(input: &str) -> Option<String> {
    let code = input.trim().to_ascii_uppercase();
    let well_formed = code.len() == TRACKING_CODE_LEN
        && code.bytes().all(|b| TRACKING_CODE_CHARSET.contains(&b));
    well_formed.then_some(code)
}
