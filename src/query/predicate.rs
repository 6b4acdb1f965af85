//! `Has` expression evaluation

use super::path::FieldPath;
use super::statement::{HasExpression, Predicate};
use super::traveler::Traveler;
use crate::graph::PropertyValue;
use regex::Regex;
use std::cmp::Ordering;

/// `HasExpression` with its field paths parsed once
#[derive(Debug, Clone)]
pub enum HasFilter {
    And(Vec<HasFilter>),
    Or(Vec<HasFilter>),
    Not(Box<HasFilter>),
    Test {
        path: FieldPath,
        predicate: Predicate,
        value: PropertyValue,
    },
    Matches {
        path: FieldPath,
        pattern: Regex,
    },
}

impl HasFilter {
    /// Fails only on a malformed regular expression
    pub fn new(expression: &HasExpression) -> Result<Self, regex::Error> {
        Ok(match expression {
            HasExpression::And(parts) => {
                HasFilter::And(parts.iter().map(HasFilter::new).collect::<Result<_, _>>()?)
            }
            HasExpression::Or(parts) => {
                HasFilter::Or(parts.iter().map(HasFilter::new).collect::<Result<_, _>>()?)
            }
            HasExpression::Not(inner) => HasFilter::Not(Box::new(HasFilter::new(inner)?)),
            HasExpression::Condition(cond) if cond.predicate == Predicate::Regex => {
                let pattern = cond.value.as_string().unwrap_or_default();
                HasFilter::Matches {
                    path: FieldPath::parse(&cond.key),
                    pattern: Regex::new(pattern)?,
                }
            }
            HasExpression::Condition(cond) => HasFilter::Test {
                path: FieldPath::parse(&cond.key),
                predicate: cond.predicate,
                value: cond.value.clone(),
            },
        })
    }

    pub fn matches(&self, traveler: &Traveler) -> bool {
        match self {
            HasFilter::And(parts) => parts.iter().all(|p| p.matches(traveler)),
            HasFilter::Or(parts) => parts.iter().any(|p| p.matches(traveler)),
            HasFilter::Not(inner) => !inner.matches(traveler),
            HasFilter::Test {
                path,
                predicate,
                value,
            } => test(*predicate, path.resolve(traveler).as_ref(), value),
            HasFilter::Matches { path, pattern } => match path.resolve(traveler) {
                Some(PropertyValue::String(s)) => pattern.is_match(&s),
                _ => false,
            },
        }
    }
}

fn bounds(value: &PropertyValue) -> Option<(&PropertyValue, &PropertyValue)> {
    match value.as_array().map(Vec::as_slice) {
        Some([lo, hi]) => Some((lo, hi)),
        _ => None,
    }
}

fn within(list: &PropertyValue, field: &PropertyValue) -> bool {
    match list.as_array() {
        Some(items) => items.iter().any(|item| item.loosely_equals(field)),
        None => list.loosely_equals(field),
    }
}

/// Apply one predicate; a missing field only satisfies the negative forms
pub fn test(predicate: Predicate, field: Option<&PropertyValue>, value: &PropertyValue) -> bool {
    let field = match field {
        Some(field) => field,
        None => return matches!(predicate, Predicate::Neq | Predicate::Without),
    };
    let cmp = || field.compare(value);
    match predicate {
        Predicate::Eq => field.loosely_equals(value),
        Predicate::Neq => !field.loosely_equals(value),
        Predicate::Gt => cmp() == Some(Ordering::Greater),
        Predicate::Gte => matches!(cmp(), Some(Ordering::Greater | Ordering::Equal)),
        Predicate::Lt => cmp() == Some(Ordering::Less),
        Predicate::Lte => matches!(cmp(), Some(Ordering::Less | Ordering::Equal)),
        Predicate::Inside => match bounds(value) {
            Some((lo, hi)) => {
                field.compare(lo) == Some(Ordering::Greater) && field.compare(hi) == Some(Ordering::Less)
            }
            None => false,
        },
        Predicate::Outside => match bounds(value) {
            Some((lo, hi)) => {
                field.compare(lo) == Some(Ordering::Less) || field.compare(hi) == Some(Ordering::Greater)
            }
            None => false,
        },
        Predicate::Between => match bounds(value) {
            Some((lo, hi)) => {
                matches!(field.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                    && field.compare(hi) == Some(Ordering::Less)
            }
            None => false,
        },
        Predicate::Within => within(value, field),
        Predicate::Without => !within(value, field),
        Predicate::Contains => match field {
            PropertyValue::Array(items) => items.iter().any(|item| item.loosely_equals(value)),
            PropertyValue::String(s) => value.as_string().map(|needle| s.contains(needle)).unwrap_or(false),
            _ => false,
        },
        Predicate::Regex => value
            .as_string()
            .zip(field.as_string())
            .and_then(|(pattern, s)| Regex::new(pattern).ok().map(|re| re.is_match(s)))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Vertex;
    use crate::query::traveler::ElementRef;

    fn alex() -> Traveler {
        let v = Vertex::new("1", "Person")
            .with_property("name", "Alex")
            .with_property("age", 34i64)
            .with_property("tags", vec![PropertyValue::from("admin"), PropertyValue::from("ops")]);
        Traveler::new().with_current(ElementRef::vertex(v, true))
    }

    fn check(expr: HasExpression) -> bool {
        HasFilter::new(&expr).unwrap().matches(&alex())
    }

    #[test]
    fn test_comparisons() {
        assert!(check(HasExpression::eq("name", "Alex")));
        assert!(check(HasExpression::eq("age", 34.0)));
        assert!(check(HasExpression::gt("age", 30i64)));
        assert!(!check(HasExpression::lt("age", 30i64)));
        assert!(check(HasExpression::lte("age", 34i64)));
        assert!(check(HasExpression::neq("missing", 1i64)));
        assert!(!check(HasExpression::eq("missing", 1i64)));
        assert!(!check(HasExpression::gt("name", 3i64)));
    }

    #[test]
    fn test_ranges_and_sets() {
        assert!(check(HasExpression::between("age", 34i64, 40i64)));
        assert!(!check(HasExpression::between("age", 20i64, 34i64)));
        assert!(check(HasExpression::condition(
            "age",
            Predicate::Outside,
            vec![PropertyValue::Integer(0), PropertyValue::Integer(18)]
        )));
        assert!(check(HasExpression::within("name", vec!["Kyle", "Alex"])));
        assert!(check(HasExpression::condition("name", Predicate::Without, vec![PropertyValue::from("Kyle")])));
        assert!(check(HasExpression::contains("tags", "ops")));
        assert!(check(HasExpression::contains("name", "le")));
    }

    #[test]
    fn test_regex() {
        assert!(check(HasExpression::condition("name", Predicate::Regex, "^Al")));
        assert!(!check(HasExpression::condition("name", Predicate::Regex, "^Ky")));
        assert!(!check(HasExpression::condition("age", Predicate::Regex, "3")));
        assert!(HasFilter::new(&HasExpression::condition("name", Predicate::Regex, "(")).is_err());
    }

    #[test]
    fn test_boolean_composition() {
        assert!(check(HasExpression::and(vec![
            HasExpression::eq("_label", "Person"),
            HasExpression::not(HasExpression::eq("name", "Kyle")),
        ])));
        assert!(check(HasExpression::or(vec![
            HasExpression::eq("name", "Kyle"),
            HasExpression::eq("_gid", "1"),
        ])));
        assert!(check(HasExpression::and(vec![])));
        assert!(!check(HasExpression::or(vec![])));
    }
}
