use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("invalid seed '{0}': expected a decimal or 0x-prefixed integer")]
    Invalid(String),
    #[error("no seeds given")]
    Empty,
}

fn parse_seed(token: &str) -> Result<u64, SeedError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => token.replace('_', "").parse(),
    };
    parsed.map_err(|_| SeedError::Invalid(token.to_string()))
}

/// Resolve CLI seed tokens, dropping duplicates while keeping order.
///
/// # Errors
///
/// Returns an error for an unparseable token or an empty list.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>, SeedError> {
    let mut seeds = Vec::new();
    for token in tokens {
        let seed = parse_seed(token)?;
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }
    if seeds.is_empty() {
        return Err(SeedError::Empty);
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn accepts_decimal_hex_and_underscores() {
        let seeds = resolve_seed_inputs(&tokens(&["1337", "0xC0FFEE", "1_000", "1337"])).unwrap();
        assert_eq!(seeds, vec![1337, 0x00C0_FFEE, 1000]);
    }

    #[test]
    fn rejects_garbage_and_empty_lists() {
        assert_eq!(
            resolve_seed_inputs(&tokens(&["12", "abc"])),
            Err(SeedError::Invalid("abc".to_string()))
        );
        assert_eq!(resolve_seed_inputs(&[]), Err(SeedError::Empty));
    }
}
