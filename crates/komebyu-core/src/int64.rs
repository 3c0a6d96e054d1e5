use serde::{Serialize, Serializer};

/// Largest integer magnitude a double-precision host can hold exactly.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// 64-bit integer for the host surface. Values within the safe-integer
/// range serialize as JSON numbers; larger magnitudes (millisecond
/// timestamps and the like) serialize as decimal strings so nothing is
/// rounded on the far side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Int64(pub i64);

impl Int64 {
    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_safe(self) -> bool {
        self.0.unsigned_abs() <= MAX_SAFE_INTEGER as u64
    }
}

impl From<i64> for Int64 {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Int64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Int64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_safe() {
            serializer.serialize_i64(self.0)
        } else {
            serializer.collect_str(&self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Int64, MAX_SAFE_INTEGER};

    #[test]
    fn safe_values_serialize_as_numbers() {
        let json = serde_json::to_string(&Int64(MAX_SAFE_INTEGER)).unwrap();
        assert_eq!(json, MAX_SAFE_INTEGER.to_string());
        assert_eq!(serde_json::to_string(&Int64(-42)).unwrap(), "-42");
    }

    #[test]
    fn unsafe_magnitudes_serialize_as_decimal_strings() {
        let json = serde_json::to_string(&Int64(MAX_SAFE_INTEGER + 1)).unwrap();
        assert_eq!(json, format!("\"{}\"", MAX_SAFE_INTEGER + 1));
        let json = serde_json::to_string(&Int64(i64::MIN)).unwrap();
        assert_eq!(json, format!("\"{}\"", i64::MIN));
    }
}
