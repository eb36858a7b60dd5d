//! Parse response header lines.

/// Extract the value of cookie `name` from a raw `Set-Cookie:` header line.
/// Returns None for other headers or other cookies.
pub(crate) fn set_cookie_value(line: &str, name: &str) -> Option<String> {
    let (header, value) = line.trim().split_once(':')?;
    if !header.trim().eq_ignore_ascii_case("set-cookie") {
        return None;
    }
    let pair = value.trim().split(';').next()?;
    let (k, v) = pair.split_once('=')?;
    if k.trim() == name {
        Some(v.trim().to_string())
    } else {
        None
    }
}
