// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission condition evaluation.
//!
//! Conditions are a closed set of `type x operator` pairs interpreted by
//! [`evaluate`]. Evaluation is pure: everything it looks at is passed in.

use crate::domain::access::OWN_TENANT;
use crate::domain::document::parse_number;
use crate::domain::{AccessRequest, ConditionOperator, ConditionType, PermissionCondition, User};
use chrono::{DateTime, Timelike, Utc};
use serde_json::Value;

/// What a condition is evaluated against.
#[derive(Clone, Copy, Debug)]
pub struct ConditionInput<'a> {
    /// The request being authorised
    pub request: &'a AccessRequest,
    /// The requesting user
    pub user: &'a User,
    /// Evaluation time
    pub now: DateTime<Utc>,
}

/// Returns `true` if every condition holds. Stops at the first failure.
pub fn all_hold(conditions: &[PermissionCondition], input: &ConditionInput<'_>) -> bool {
    conditions.iter().all(|condition| evaluate(condition, input))
}

/// Evaluates one condition.
///
/// A condition whose subject is absent from the request (no tenant, no IP,
/// no such attribute) does not hold.
pub fn evaluate(condition: &PermissionCondition, input: &ConditionInput<'_>) -> bool {
    let request = input.request;
    if condition.condition == ConditionType::Tenant && is_own_tenant(&condition.value) {
        let owns = request
            .tenant_hash
            .as_deref()
            .map(|tenant| input.user.can_access_tenant(tenant))
            .unwrap_or(false);
        return match condition.operator {
            ConditionOperator::Equals | ConditionOperator::In => owns,
            ConditionOperator::NotEquals | ConditionOperator::NotIn => {
                request.tenant_hash.is_some() && !owns
            }
            _ => false,
        };
    }

    let actual = match &condition.condition {
        ConditionType::Environment => Some(Value::from(request.environment.as_str())),
        ConditionType::Tenant => request.tenant_hash.clone().map(Value::from),
        ConditionType::Time => Some(Value::from(input.now.hour())),
        ConditionType::Ip => request.ip_address.clone().map(Value::from),
        ConditionType::Custom(key) => request.attributes.get(key).cloned(),
    };
    match actual {
        Some(actual) => compare(&actual, condition.operator, &condition.value),
        None => false,
    }
}

fn is_own_tenant(value: &Value) -> bool {
    value.as_str() == Some(OWN_TENANT)
}

fn compare(actual: &Value, operator: ConditionOperator, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => loosely_equal(actual, expected),
        ConditionOperator::NotEquals => !loosely_equal(actual, expected),
        ConditionOperator::In => expected
            .as_array()
            .map(|items| items.iter().any(|item| loosely_equal(actual, item)))
            .unwrap_or(false),
        ConditionOperator::NotIn => expected
            .as_array()
            .map(|items| !items.iter().any(|item| loosely_equal(actual, item)))
            .unwrap_or(false),
        ConditionOperator::GreaterThan => match (parse_number(actual), parse_number(expected)) {
            (Some(a), Some(e)) => a > e,
            _ => false,
        },
        ConditionOperator::LessThan => match (parse_number(actual), parse_number(expected)) {
            (Some(a), Some(e)) => a < e,
            _ => false,
        },
    }
}

/// Equality that treats `"9"` and `9` as equal.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            parse_number(a) == parse_number(b) && parse_number(a).is_some()
        }
        _ => false,
    }
}
