//! Typed endpoint requests and their field validation.
//!
//! # Responsibility
//! - Turn a JSON body or a query-pair list into a typed request.
//! - Collect every field error of one request before rejecting it.
//!
//! # Invariants
//! - Integer fields accept JSON integers, integral floats and numeric strings.
//! - Bodies reject keys they do not declare; list queries ignore them.
//! - `team_ids` length is checked on the raw list, before duplicates collapse.

use crate::model::experiment::{validate_team_count, SortKey, SortOrder};
use crate::model::team::TeamId;
use crate::service::experiment_service::{ListExperimentsFilter, DEFAULT_PAGE_LIMIT};
use crate::validation::{
    one_of_message, ValidationErrors, INVALID_BODY, MISSING_FIELD, NOT_AN_INTEGER, NOT_A_LIST,
    NOT_A_STRING, NULL_FIELD, SCHEMA_FIELD, TEAM_IDS_LENGTH, UNKNOWN_FIELD,
};
use serde_json::{Map, Value};

type Object = Map<String, Value>;

/// Query key carrying repeated team ids.
pub const TEAM_IDS_QUERY_KEY: &str = "team_ids[]";

/// `POST /experiments`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateExperimentRequest {
    pub description: String,
    pub sample_ratio: i64,
    pub team_ids: Vec<TeamId>,
}

impl CreateExperimentRequest {
    const FIELDS: &'static [&'static str] = &["id", "description", "sample_ratio", "team_ids"];

    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let object = as_object(body)?;
        let mut errors = ValidationErrors::new();
        reject_unknown_fields(object, Self::FIELDS, &mut errors);
        optional_integer(object, "id", &mut errors);

        let description = required_string(object, "description", &mut errors);
        let sample_ratio = required_integer(object, "sample_ratio", &mut errors);
        let team_ids = required_team_ids(object, &mut errors);

        match (description, sample_ratio, team_ids) {
            (Some(description), Some(sample_ratio), Some(team_ids)) => errors.into_result(Self {
                description,
                sample_ratio,
                team_ids,
            }),
            _ => Err(errors),
        }
    }
}

/// `PUT /experiments/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExperimentRequest {
    pub team_ids: Vec<TeamId>,
}

impl UpdateExperimentRequest {
    const FIELDS: &'static [&'static str] = &["team_ids"];

    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let object = as_object(body)?;
        let mut errors = ValidationErrors::new();
        reject_unknown_fields(object, Self::FIELDS, &mut errors);

        match required_team_ids(object, &mut errors) {
            Some(team_ids) => errors.into_result(Self { team_ids }),
            None => Err(errors),
        }
    }
}

/// `POST /teams`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTeamRequest {
    pub name: String,
    pub parent_team_id: Option<TeamId>,
}

impl CreateTeamRequest {
    const FIELDS: &'static [&'static str] = &["id", "name", "parent_team_id"];

    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let object = as_object(body)?;
        let mut errors = ValidationErrors::new();
        reject_unknown_fields(object, Self::FIELDS, &mut errors);
        optional_integer(object, "id", &mut errors);

        let name = required_string(object, "name", &mut errors);
        let parent_team_id = optional_integer(object, "parent_team_id", &mut errors);

        match name {
            Some(name) => errors.into_result(Self {
                name,
                parent_team_id,
            }),
            None => Err(errors),
        }
    }
}

/// Parses `GET /experiments` query pairs.
///
/// The first occurrence of a scalar key wins; `team_ids[]` collects every
/// occurrence in order.
pub fn parse_list_query(pairs: &[(String, String)]) -> Result<ListExperimentsFilter, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let page = first_value(pairs, "page")
        .map(|raw| parse_query_integer("page", raw, &mut errors))
        .unwrap_or(Some(0));
    let limit = first_value(pairs, "limit")
        .map(|raw| parse_query_integer("limit", raw, &mut errors))
        .unwrap_or(Some(i64::from(DEFAULT_PAGE_LIMIT)));

    let sort_order = match first_value(pairs, "order_by") {
        Some(raw) => SortOrder::parse(raw).or_else(|| {
            let choices = SortOrder::ALL.map(SortOrder::as_str);
            errors.add("order_by", one_of_message(&choices));
            None
        }),
        None => Some(SortOrder::default()),
    };
    let sort_key = match first_value(pairs, "sort_by") {
        Some(raw) => SortKey::parse(raw).or_else(|| {
            let choices = SortKey::ALL.map(SortKey::as_str);
            errors.add("sort_by", one_of_message(&choices));
            None
        }),
        None => Some(SortKey::default()),
    };

    let raw_team_ids: Vec<&str> = pairs
        .iter()
        .filter(|(key, _)| key == TEAM_IDS_QUERY_KEY)
        .map(|(_, value)| value.as_str())
        .collect();
    let team_ids: Option<Vec<TeamId>> = raw_team_ids
        .iter()
        .map(|raw| raw.trim().parse::<TeamId>().ok())
        .collect();
    if team_ids.is_none() {
        errors.add(TEAM_IDS_QUERY_KEY, NOT_AN_INTEGER);
    }

    match (page, limit, sort_order, sort_key, team_ids) {
        (Some(page), Some(limit), Some(sort_order), Some(sort_key), Some(team_ids)) => errors
            .into_result(ListExperimentsFilter {
                team_ids: (!team_ids.is_empty()).then_some(team_ids),
                page,
                limit,
                sort_key,
                sort_order,
            }),
        _ => Err(errors),
    }
}

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, value)| value.as_str())
}

fn parse_query_integer(field: &str, raw: &str, errors: &mut ValidationErrors) -> Option<i64> {
    let parsed = raw.trim().parse::<i64>().ok();
    if parsed.is_none() {
        errors.add(field, NOT_AN_INTEGER);
    }
    parsed
}

fn as_object(body: &Value) -> Result<&Object, ValidationErrors> {
    body.as_object()
        .ok_or_else(|| ValidationErrors::single(SCHEMA_FIELD, INVALID_BODY))
}

fn reject_unknown_fields(object: &Object, known: &[&str], errors: &mut ValidationErrors) {
    for key in object.keys() {
        if !known.contains(&key.as_str()) {
            errors.add(key.as_str(), UNKNOWN_FIELD);
        }
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .filter(|float| (i64::MIN as f64..i64::MAX as f64).contains(float))
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn required_string(object: &Object, field: &str, errors: &mut ValidationErrors) -> Option<String> {
    match object.get(field) {
        None => {
            errors.add(field, MISSING_FIELD);
            None
        }
        Some(Value::Null) => {
            errors.add(field, NULL_FIELD);
            None
        }
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            errors.add(field, NOT_A_STRING);
            None
        }
    }
}

fn required_integer(object: &Object, field: &str, errors: &mut ValidationErrors) -> Option<i64> {
    match object.get(field) {
        None => {
            errors.add(field, MISSING_FIELD);
            None
        }
        Some(Value::Null) => {
            errors.add(field, NULL_FIELD);
            None
        }
        Some(value) => {
            let parsed = integer_value(value);
            if parsed.is_none() {
                errors.add(field, NOT_AN_INTEGER);
            }
            parsed
        }
    }
}

/// Absent and `null` both read as `None`.
fn optional_integer(object: &Object, field: &str, errors: &mut ValidationErrors) -> Option<i64> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = integer_value(value);
            if parsed.is_none() {
                errors.add(field, NOT_AN_INTEGER);
            }
            parsed
        }
    }
}

fn required_team_ids(object: &Object, errors: &mut ValidationErrors) -> Option<Vec<TeamId>> {
    const FIELD: &str = "team_ids";

    let items = match object.get(FIELD) {
        None => {
            errors.add(FIELD, MISSING_FIELD);
            return None;
        }
        Some(Value::Null) => {
            errors.add(FIELD, NULL_FIELD);
            return None;
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.add(FIELD, NOT_A_LIST);
            return None;
        }
    };

    let Some(team_ids) = items.iter().map(integer_value).collect::<Option<Vec<TeamId>>>() else {
        errors.add(FIELD, NOT_AN_INTEGER);
        return None;
    };
    if validate_team_count(team_ids.len()).is_err() {
        errors.add(FIELD, TEAM_IDS_LENGTH);
        return None;
    }
    Some(team_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn create_experiment_collects_every_field_error() {
        let errors = CreateExperimentRequest::from_json(&json!({
            "sample_ratio": "many",
            "team_ids": 3,
            "color": "red",
        }))
        .unwrap_err();

        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({
                "color": [UNKNOWN_FIELD],
                "description": [MISSING_FIELD],
                "sample_ratio": [NOT_AN_INTEGER],
                "team_ids": [NOT_A_LIST],
            })
        );
    }

    #[test]
    fn create_experiment_checks_raw_team_id_length() {
        let body = json!({"description": "d", "sample_ratio": 1, "team_ids": [1, 2, 3]});
        let errors = CreateExperimentRequest::from_json(&body).unwrap_err();
        assert_eq!(errors.messages("team_ids"), [TEAM_IDS_LENGTH]);

        let body = json!({"description": "d", "sample_ratio": 1, "team_ids": []});
        let errors = CreateExperimentRequest::from_json(&body).unwrap_err();
        assert_eq!(errors.messages("team_ids"), [TEAM_IDS_LENGTH]);
    }

    #[test]
    fn create_experiment_accepts_numeric_strings_and_integral_floats() {
        let request = CreateExperimentRequest::from_json(&json!({
            "description": "search ranking",
            "sample_ratio": "30",
            "team_ids": [4.0, "5"],
        }))
        .unwrap();

        assert_eq!(request.sample_ratio, 30);
        assert_eq!(request.team_ids, vec![4, 5]);
    }

    #[test]
    fn non_object_body_is_a_schema_error() {
        let errors = UpdateExperimentRequest::from_json(&json!([1, 2])).unwrap_err();
        assert_eq!(errors.messages(SCHEMA_FIELD), [INVALID_BODY]);
    }

    #[test]
    fn update_rejects_non_integer_team_ids() {
        let errors = UpdateExperimentRequest::from_json(&json!({"team_ids": [1, "x"]})).unwrap_err();
        assert_eq!(errors.messages("team_ids"), [NOT_AN_INTEGER]);
    }

    #[test]
    fn create_team_parent_is_optional_and_nullable() {
        let request = CreateTeamRequest::from_json(&json!({"name": "core"})).unwrap();
        assert_eq!(request.parent_team_id, None);

        let request =
            CreateTeamRequest::from_json(&json!({"name": "core", "parent_team_id": null})).unwrap();
        assert_eq!(request.parent_team_id, None);

        let request =
            CreateTeamRequest::from_json(&json!({"name": "core", "parent_team_id": 7})).unwrap();
        assert_eq!(request.parent_team_id, Some(7));

        let errors = CreateTeamRequest::from_json(&json!({"name": 5})).unwrap_err();
        assert_eq!(errors.messages("name"), [NOT_A_STRING]);
    }

    #[test]
    fn list_query_defaults_and_ignores_unknown_keys() {
        let filter = parse_list_query(&pairs(&[("verbose", "1")])).unwrap();
        assert_eq!(filter.page, 0);
        assert_eq!(filter.limit, i64::from(DEFAULT_PAGE_LIMIT));
        assert_eq!(filter.sort_key, SortKey::Id);
        assert_eq!(filter.sort_order, SortOrder::Asc);
        assert_eq!(filter.team_ids, None);
    }

    #[test]
    fn list_query_reports_each_bad_parameter() {
        let errors = parse_list_query(&pairs(&[
            ("page", "two"),
            ("limit", "1.5"),
            ("order_by", "up"),
            ("sort_by", "description"),
            ("team_ids[]", "1"),
            ("team_ids[]", "abc"),
        ]))
        .unwrap_err();

        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({
                "limit": [NOT_AN_INTEGER],
                "order_by": ["Must be one of: asc, desc."],
                "page": [NOT_AN_INTEGER],
                "sort_by": ["Must be one of: id, sample_ratio."],
                "team_ids[]": [NOT_AN_INTEGER],
            })
        );
    }

    #[test]
    fn list_query_first_scalar_wins_and_team_ids_repeat() {
        let filter = parse_list_query(&pairs(&[
            ("page", "3"),
            ("page", "9"),
            ("order_by", "desc"),
            ("sort_by", "sample_ratio"),
            ("team_ids[]", "2"),
            ("team_ids[]", "5"),
        ]))
        .unwrap();

        assert_eq!(filter.page, 3);
        assert_eq!(filter.sort_order, SortOrder::Desc);
        assert_eq!(filter.sort_key, SortKey::SampleRatio);
        assert_eq!(filter.team_ids, Some(vec![2, 5]));
    }
}
