use crate::value::{self, Value};

/// An ordered sequence of fields.
///
/// Field names are not required to be unique; duplicates survive
/// conversion so that callers can detect them.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            fields: Vec::with_capacity(n),
        }
    }

    /// Append a field, keeping any existing field with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every field named `name`. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|(n, _)| n != name);
        before - self.fields.len()
    }

    /// Replace the first field named `name` in place. Returns false when absent.
    pub fn replace(&mut self, name: &str, value: Value) -> bool {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                *v = value;
                true
            }
            None => false,
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<(String, Value)> {
        &mut self.fields
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        value::write_document(&mut out, self, 0);
        out.push('\n');
        out
    }
}

/// Documents are equal when their field names match in order and the
/// values match positionally.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((n1, v1), (n2, v2))| n1 == n2 && v1 == v2)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// An ordered sequence of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        value::write_array(&mut out, self, 0);
        out.push('\n');
        out
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
