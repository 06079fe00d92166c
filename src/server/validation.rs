use crate::server::response::ApiError;

const MAX_COLLECTION_NAME_LEN: usize = 120;
const MAX_SAMPLE_FIELD_LEN: usize = 200;

/// Trims and checks a collection name, returning the trimmed value.
pub fn validate_collection_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Collection name cannot be empty"));
    }
    if name.chars().count() > MAX_COLLECTION_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Collection name cannot exceed {MAX_COLLECTION_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_sample_field(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} cannot be empty")));
    }
    if value.chars().count() > MAX_SAMPLE_FIELD_LEN {
        return Err(ApiError::bad_request(format!(
            "{field} cannot exceed {MAX_SAMPLE_FIELD_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

pub fn validate_sample_title(title: &str) -> Result<String, ApiError> {
    validate_sample_field(title, "Title")
}

pub fn validate_material_type(material_type: &str) -> Result<String, ApiError> {
    validate_sample_field(material_type, "Material type")
}

pub fn validate_sample_ids(ids: &[String]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Err(ApiError::bad_request("sample_ids cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_trimmed_and_bounded() {
        assert_eq!(validate_collection_name("  Tiles ").unwrap(), "Tiles");
        assert!(validate_collection_name("   ").is_err());
        assert!(validate_collection_name(&"x".repeat(120)).is_ok());
        assert!(validate_collection_name(&"x".repeat(121)).is_err());
    }

    #[test]
    fn test_sample_fields() {
        assert_eq!(validate_sample_title(" Linen ").unwrap(), "Linen");
        assert!(validate_material_type("").is_err());
        assert!(validate_sample_ids(&[]).is_err());
    }
}
