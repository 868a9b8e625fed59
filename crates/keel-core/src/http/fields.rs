/// Whether a field travels before or after the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPosition {
    #[default]
    Header,
    Trailer,
}

/// One named field with all of its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    values: Vec<String>,
    kind: FieldPosition,
}

impl Field {
    pub fn new(name: impl Into<String>, values: Vec<String>, kind: FieldPosition) -> Self {
        Self {
            name: name.into(),
            values,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub const fn kind(&self) -> FieldPosition {
        self.kind
    }

    /// Values joined for a single header line.
    pub fn as_string(&self) -> String {
        self.values.join(", ")
    }
}

/// Ordered, case-insensitive, multi-valued fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<Field>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Adds a value, keeping existing values of the same field.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values.push(value.into()),
            None => self.entries.push(Field::new(
                name,
                vec![value.into()],
                FieldPosition::Header,
            )),
        }
    }

    /// Replaces every value of the field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(index) => self.entries[index].values = vec![value.into()],
            None => self.entries.push(Field::new(
                name,
                vec![value.into()],
                FieldPosition::Header,
            )),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    pub fn insert_field(&mut self, field: Field) {
        match self.position(&field.name) {
            Some(index) => self.entries[index] = field,
            None => self.entries.push(field),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.position(name).map(|index| &self.entries[index])
    }

    /// First value of the field.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|field| field.values.first())
            .map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        self.position(name).map(|index| self.entries.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter()
    }

    /// Copies every field of `other`, appending to existing values.
    pub fn extend(&mut self, other: &Fields) {
        for field in &other.entries {
            for value in &field.values {
                self.append(field.name.clone(), value.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive_and_values_accumulate() {
        let mut fields = Fields::new();
        fields.append("X-Tag", "a");
        fields.append("x-tag", "b");

        assert_eq!(fields.len(), 1);
        assert_eq!(
            fields.get("X-TAG").map(Field::as_string).as_deref(),
            Some("a, b")
        );
    }

    #[test]
    fn set_replaces_existing_values() {
        let mut fields = Fields::new().with("content-type", "text/plain");
        fields.set("Content-Type", "application/json");
        assert_eq!(fields.first("content-type"), Some("application/json"));
    }
}
