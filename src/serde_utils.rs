use serde::{Deserialize, Deserializer};

/// Reads an optional string, mapping `null`, a missing value and `""` to `None`.
pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TestStruct {
        #[serde(default, deserialize_with = "deserialize_non_empty_string")]
        temp_id: Option<String>,
    }

    #[test]
    fn test_deserialize_non_empty_string() {
        let parse = |json: &str| serde_json::from_str::<TestStruct>(json).unwrap().temp_id;

        assert_eq!(parse(r#"{"temp_id": "abc"}"#), Some("abc".to_string()));
        assert_eq!(parse(r#"{"temp_id": ""}"#), None);
        assert_eq!(parse(r#"{"temp_id": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }
}
