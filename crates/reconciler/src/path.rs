//! Field paths used to point at the offending field in error reports.
use std::fmt::{Display, Write};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Segment {
    Field(String),
    Index(usize),
}

/// The location of a field inside a resource tree, displayed as
/// `rules[1].port`.
///
/// The root path is empty and displays as `<root>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Creates a path for a subfield of the current path.
    pub fn field(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.segments.push(Segment::Field(name.into()));
        path
    }

    /// Creates a path for an element of the collection at the current path.
    pub fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.segments.push(Segment::Index(index));
        path
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) => {
                    if i > 0 {
                        f.write_char('.')?;
                    }
                    f.write_str(name)?;
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let path = FieldPath::root().field("rules").index(1).field("port");
        assert_eq!(path.to_string(), "rules[1].port");
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }
}
