use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::domain::{DIMENSION_PLACEHOLDER, DimensionValue, QueryDescriptor};
use crate::error::CollectorError;

// Unreserved characters plus '/', everything else is escaped.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT).to_string()
}

/// Ordered `(name, value)` pairs for a descriptor with the dimension substituted.
pub fn render_params(
    descriptor: &QueryDescriptor,
    dimension: Option<&DimensionValue>,
) -> Result<Vec<(String, String)>, CollectorError> {
    let substitute = match (descriptor.expand_by_dimension, dimension) {
        (true, Some(value)) => Some(value.as_str()),
        (true, None) => return Err(CollectorError::MissingDimension(descriptor.id.to_string())),
        (false, _) if descriptor.uses_placeholder() => {
            return Err(CollectorError::UnexpectedPlaceholder(
                descriptor.id.to_string(),
            ));
        }
        (false, _) => None,
    };
    let render = |template: &str| match substitute {
        Some(value) => template.replace(DIMENSION_PLACEHOLDER, value),
        None => template.to_string(),
    };

    let mut params = Vec::with_capacity(descriptor.params.len() + 2);
    if let Some(orderby) = &descriptor.orderby {
        params.push(("orderby".to_string(), render(orderby)));
    }
    if let Some(take) = descriptor.take {
        params.push(("take".to_string(), take.to_string()));
    }
    for (key, value) in &descriptor.params {
        params.push((render(key), render(value)));
    }
    Ok(params)
}

pub fn build_url(
    base_url: &str,
    descriptor: &QueryDescriptor,
    dimension: Option<&DimensionValue>,
) -> Result<String, CollectorError> {
    let query = render_params(descriptor, dimension)?
        .iter()
        .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        return Ok(format!("{base_url}{}", descriptor.endpoint));
    }
    Ok(format!("{base_url}{}?{query}", descriptor.endpoint))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use indexmap::IndexMap;

    use super::*;

    const BASE: &str = "https://erp.example.com/api/";

    fn descriptor(where_clause: &str, expand: bool) -> QueryDescriptor {
        QueryDescriptor {
            id: "Consulta_1".parse().unwrap(),
            endpoint: "System.MaterialTransactions.List.View1".to_string(),
            orderby: Some("ctxn_transaction_date desc".to_string()),
            take: Some(30000),
            params: IndexMap::from([("where".to_string(), where_clause.to_string())]),
            artifact: "Consulta_1".to_string(),
            expand_by_dimension: expand,
        }
    }

    #[test]
    fn builds_encoded_url_in_declared_order() {
        let desc = descriptor("ctxn_warehouse_code ilike '1145'", false);
        let url = build_url(BASE, &desc, None).unwrap();
        assert_eq!(
            url,
            "https://erp.example.com/api/System.MaterialTransactions.List.View1?\
             orderby=ctxn_transaction_date%20desc&take=30000&\
             where=ctxn_warehouse_code%20ilike%20%271145%27"
        );
    }

    #[test]
    fn escapes_percent_quotes_and_parentheses() {
        let encoded = encode_component("ilike '261%25%' and (x > 1)");
        assert_eq!(
            encoded,
            "ilike%20%27261%2525%25%27%20and%20%28x%20%3E%201%29"
        );
        assert_eq!(encode_component("a&b=c"), "a%26b%3Dc");
    }

    #[test]
    fn substitutes_dimension_value() {
        let desc = descriptor("ctxn_warehouse_code ilike '{dimension}'", true);
        let value: DimensionValue = "1290".parse().unwrap();
        let url = build_url(BASE, &desc, Some(&value)).unwrap();
        assert!(url.ends_with("where=ctxn_warehouse_code%20ilike%20%271290%27"));
        assert!(!url.contains("dimension"));
        assert!(!url.contains("%7B"));
    }

    #[test]
    fn expanded_descriptor_requires_dimension() {
        let desc = descriptor("ctxn_warehouse_code ilike '{dimension}'", true);
        let err = build_url(BASE, &desc, None).unwrap_err();
        assert_matches!(err, CollectorError::MissingDimension(_));
    }

    #[test]
    fn placeholder_without_expansion_is_rejected() {
        let desc = descriptor("ctxn_warehouse_code ilike '{dimension}'", false);
        let err = build_url(BASE, &desc, None).unwrap_err();
        assert_matches!(err, CollectorError::UnexpectedPlaceholder(_));
    }

    #[test]
    fn descriptor_without_params_has_no_query_string() {
        let mut desc = descriptor("", false);
        desc.orderby = None;
        desc.take = None;
        desc.params.clear();
        let url = build_url(BASE, &desc, None).unwrap();
        assert_eq!(url, "https://erp.example.com/api/System.MaterialTransactions.List.View1");
    }
}
