//! Response envelopes.
//!
//! Each endpoint family wraps its payload differently. The caller knows which
//! family it called and says so with an `EnvelopeKind`; the shape is never
//! guessed from the body.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Reporting views: `{ "value": [...], "@odata.nextLink": "..." }`
    ODataList,
    /// Vendor REST returning one record: `{ "status": .., "data": {...} }`
    RestSingle,
    /// Vendor REST returning a page of records: `{ "status": .., "data": [...] }`
    RestPaged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    ODataList {
        items: Vec<Value>,
        next_link: Option<String>,
    },
    RestSingle {
        data: Value,
    },
    RestPaged {
        items: Vec<Value>,
        page_number: Option<u64>,
        total_pages: Option<u64>,
    },
}

#[derive(Deserialize)]
struct ODataListBody {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestBody {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    page_number: Option<u64>,
    #[serde(default)]
    total_pages: Option<u64>,
}

impl ResponseEnvelope {
    pub fn parse(kind: EnvelopeKind, body: Value) -> Result<Self, ApiError> {
        match kind {
            EnvelopeKind::ODataList => {
                let parsed: ODataListBody = serde_json::from_value(body)
                    .map_err(|e| ApiError::InvalidResponse(format!("not an OData list: {}", e)))?;
                Ok(ResponseEnvelope::ODataList {
                    items: parsed.value,
                    next_link: parsed.next_link,
                })
            }
            EnvelopeKind::RestSingle => {
                let parsed = parse_rest(body)?;
                Ok(ResponseEnvelope::RestSingle { data: rest_data(parsed.data)? })
            }
            EnvelopeKind::RestPaged => {
                let parsed = parse_rest(body)?;
                match rest_data(parsed.data)? {
                    Value::Array(items) => Ok(ResponseEnvelope::RestPaged {
                        items,
                        page_number: parsed.page_number,
                        total_pages: parsed.total_pages,
                    }),
                    other => Err(ApiError::InvalidResponse(format!(
                        "expected a data array, got {}",
                        json_type(&other)
                    ))),
                }
            }
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            ResponseEnvelope::ODataList { .. } => EnvelopeKind::ODataList,
            ResponseEnvelope::RestSingle { .. } => EnvelopeKind::RestSingle,
            ResponseEnvelope::RestPaged { .. } => EnvelopeKind::RestPaged,
        }
    }

    /// Records of a list envelope. A single-record envelope is an error.
    pub fn into_items(self) -> Result<Vec<Value>, ApiError> {
        match self {
            ResponseEnvelope::ODataList { items, .. } | ResponseEnvelope::RestPaged { items, .. } => Ok(items),
            ResponseEnvelope::RestSingle { .. } => Err(ApiError::InvalidResponse(
                "single-record response has no item list".to_string(),
            )),
        }
    }

    /// Payload of a single-record envelope. A list envelope is an error.
    pub fn into_single(self) -> Result<Value, ApiError> {
        match self {
            ResponseEnvelope::RestSingle { data } => Ok(data),
            other => Err(ApiError::InvalidResponse(format!(
                "{:?} response is a list, not a single record",
                other.kind()
            ))),
        }
    }

    /// First record of a list envelope, if any.
    pub fn first(self) -> Result<Option<Value>, ApiError> {
        Ok(self.into_items()?.into_iter().next())
    }

    /// Link to the next page of an OData list.
    pub fn next_link(&self) -> Option<&str> {
        match self {
            ResponseEnvelope::ODataList { next_link, .. } => next_link.as_deref(),
            _ => None,
        }
    }

    /// List records deserialized into `T`.
    pub fn items_as<T: DeserializeOwned>(self) -> Result<Vec<T>, ApiError> {
        self.into_items()?
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| ApiError::InvalidResponse(e.to_string()))
            })
            .collect()
    }
}

fn parse_rest(body: Value) -> Result<RestBody, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::InvalidResponse(format!("not a REST envelope: {}", e)))
}

fn rest_data(data: Option<Value>) -> Result<Value, ApiError> {
    data.ok_or_else(|| ApiError::InvalidResponse("REST envelope has no data field".to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_odata_list_with_next_link() {
        let body = json!({
            "@odata.context": "https://acme.csod.com/services/api/x/odata/api/views/$metadata#vw_rpt_user",
            "value": [{"user_id": 1}, {"user_id": 2}],
            "@odata.nextLink": "https://acme.csod.com/services/api/x/odata/api/views/vw_rpt_user?$skiptoken=2"
        });
        let envelope = ResponseEnvelope::parse(EnvelopeKind::ODataList, body).unwrap();
        assert!(envelope.next_link().unwrap().ends_with("$skiptoken=2"));
        assert_eq!(envelope.first().unwrap(), Some(json!({"user_id": 1})));
    }

    #[test]
    fn test_rest_single_unwraps_data() {
        let body = json!({"status": "Success", "timeStamp": "2021-01-01T00:00:00", "data": {"id": 137}});
        let envelope = ResponseEnvelope::parse(EnvelopeKind::RestSingle, body).unwrap();
        assert_eq!(envelope.clone().into_single().unwrap(), json!({"id": 137}));
        assert!(envelope.into_items().is_err());
    }

    #[test]
    fn test_rest_paged_requires_array() {
        let body = json!({"status": 200, "data": [{"id": 1}], "pageNumber": 1, "totalPages": 3});
        let envelope = ResponseEnvelope::parse(EnvelopeKind::RestPaged, body).unwrap();
        assert_eq!(
            envelope,
            ResponseEnvelope::RestPaged {
                items: vec![json!({"id": 1})],
                page_number: Some(1),
                total_pages: Some(3),
            }
        );

        let err = ResponseEnvelope::parse(EnvelopeKind::RestPaged, json!({"data": {"id": 1}})).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(ref msg) if msg.contains("an object")));
    }

    #[test]
    fn test_items_as_typed() {
        #[derive(Deserialize)]
        struct Row {
            user_id: i64,
        }
        let envelope = ResponseEnvelope::parse(EnvelopeKind::ODataList, json!({"value": [{"user_id": 7}]})).unwrap();
        let rows: Vec<Row> = envelope.items_as().unwrap();
        assert_eq!(rows[0].user_id, 7);
    }

    #[test]
    fn test_missing_data_is_invalid() {
        let err = ResponseEnvelope::parse(EnvelopeKind::RestSingle, json!({"status": 200})).unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
