use kind_defs::KindError;
use toml::Table;

fn parse_fragment(input: &str, side: &str) -> Result<Table, KindError> {
    input
        .parse::<Table>()
        .map_err(|e| KindError::MalformedConfig(format!("{} fragment: {}", side, e)))
}

/// Compares two containerd config fragments as TOML trees.
///
/// Formatting, comments and key order inside a table never matter. Table
/// nesting, scalar values and array order do. A fragment that fails to parse
/// is reported as `MalformedConfig` instead of being guessed either way.
pub fn equivalent(a: &str, b: &str) -> Result<bool, KindError> {
    let left = parse_fragment(a, "first")?;
    let right = parse_fragment(b, "second")?;
    Ok(left == right)
}

/// Patches are applied positionally, so lists of different lengths are never
/// equivalent and entries are only compared at the same index.
pub fn patches_equivalent<A, B>(a: &[A], b: &[B]) -> Result<bool, KindError>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    if a.len() != b.len() {
        return Ok(false);
    }
    for (left, right) in a.iter().zip(b.iter()) {
        if !equivalent(left.as_ref(), right.as_ref())? {
            return Ok(false);
        }
    }
    Ok(true)
}
