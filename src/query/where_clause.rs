//! Composable SQL predicates with `$*` placeholders.

use sea_query::Value;
use std::fmt;

/// Placeholder numbered `$1..$n` when the statement is finalized
pub const PLACEHOLDER: &str = "$*";

/// A predicate tree; leaves are SQL fragments with their bound values
///
/// # Example
///
/// ```
/// use tether::query::Where;
/// use sea_query::Value;
///
/// let condition = Where::new("t0.\"age\" > $*", vec![Value::from(3)])
///     .and_where(Where::create_where_in("t0.\"name\"", vec![Value::from("rex"), Value::from("fido")]));
///
/// assert_eq!(condition.to_string(), "(t0.\"age\" > $* AND t0.\"name\" IN ($*, $*))");
/// assert_eq!(condition.values().len(), 3);
/// assert_eq!(Where::default().to_string(), "TRUE");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    element: Option<String>,
    values: Vec<Value>,
    operator: Option<&'static str>,
    children: Vec<Where>,
}

impl Where {
    pub fn new(element: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            element: Some(element.into()),
            values,
            operator: None,
            children: Vec::new(),
        }
    }

    /// `field IN ($*, ...)`; an empty list matches nothing
    pub fn create_where_in(field: &str, values: Vec<Value>) -> Self {
        Self::list(field, "IN", "FALSE", values)
    }

    /// `field NOT IN ($*, ...)`; an empty list matches everything
    pub fn create_where_not_in(field: &str, values: Vec<Value>) -> Self {
        Self::list(field, "NOT IN", "TRUE", values)
    }

    fn list(field: &str, operator: &str, when_empty: &str, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Self::new(when_empty, Vec::new());
        }
        let placeholders = vec![PLACEHOLDER; values.len()].join(", ");
        Self::new(format!("{field} {operator} ({placeholders})"), values)
    }

    pub fn is_empty(&self) -> bool {
        self.element.is_none() && self.children.is_empty()
    }

    pub fn and_where(self, other: impl Into<Where>) -> Self {
        self.combine("AND", other.into())
    }

    pub fn or_where(self, other: impl Into<Where>) -> Self {
        self.combine("OR", other.into())
    }

    fn combine(mut self, operator: &'static str, other: Where) -> Self {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        if self.element.is_none() && self.operator == Some(operator) {
            self.children.push(other);
            return self;
        }
        Self {
            element: None,
            values: Vec::new(),
            operator: Some(operator),
            children: vec![self, other],
        }
    }

    /// Bound values in placeholder order
    pub fn values(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.collect_values(&mut out);
        out
    }

    fn collect_values(&self, out: &mut Vec<Value>) {
        out.extend(self.values.iter().cloned());
        for child in &self.children {
            child.collect_values(out);
        }
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(element) = &self.element {
            return f.write_str(element);
        }
        match self.children.as_slice() {
            [] => f.write_str("TRUE"),
            [only] => write!(f, "{only}"),
            children => {
                let operator = self.operator.unwrap_or("AND");
                let rendered: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "({})", rendered.join(&format!(" {operator} ")))
            }
        }
    }
}

impl From<&str> for Where {
    fn from(element: &str) -> Self {
        Where::new(element, Vec::new())
    }
}

impl From<String> for Where {
    fn from(element: String) -> Self {
        Where::new(element, Vec::new())
    }
}

/// Replace each `$*` with `$1`, `$2`, ... in order of appearance
pub fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut rest = sql;
    let mut index = 0;
    while let Some(position) = rest.find(PLACEHOLDER) {
        index += 1;
        out.push_str(&rest[..position]);
        out.push('$');
        out.push_str(&index.to_string());
        rest = &rest[position + PLACEHOLDER.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_operator_flattens() {
        let condition = Where::from("a")
            .and_where("b")
            .and_where("c");
        assert_eq!(condition.to_string(), "(a AND b AND c)");
    }

    #[test]
    fn test_mixed_operators_nest() {
        let condition = Where::from("a").or_where("b").and_where("c");
        assert_eq!(condition.to_string(), "((a OR b) AND c)");
    }

    #[test]
    fn test_empty_sides_are_absorbed() {
        let condition = Where::default().and_where(Where::new("x = $*", vec![Value::from(1)]));
        assert_eq!(condition.to_string(), "x = $*");
        assert_eq!(condition.values(), vec![Value::from(1)]);
        assert_eq!(condition.and_where(Where::default()).to_string(), "x = $*");
    }

    #[test]
    fn test_where_in_empty() {
        assert_eq!(Where::create_where_in("a", vec![]).to_string(), "FALSE");
        assert_eq!(Where::create_where_not_in("a", vec![]).to_string(), "TRUE");
    }

    #[test]
    fn test_number_placeholders() {
        assert_eq!(
            number_placeholders("a = $* AND b IN ($*, $*)"),
            "a = $1 AND b IN ($2, $3)"
        );
        assert_eq!(number_placeholders("TRUE"), "TRUE");
    }
}
