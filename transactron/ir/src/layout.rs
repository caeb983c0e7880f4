use itertools::Itertools;
use std::fmt;
use transactron_utils::Id;

/// A named member of a [Layout::Struct].
#[derive(Clone, Debug)]
pub struct Field {
    pub name: Id,
    pub layout: Layout,
}

/// Structural description of a data bus, e.g. the argument or result of a
/// method. The first field of a struct occupies the least significant bits.
///
/// Two layouts are equal iff their flattened lists of field paths and widths
/// are equal, so nesting that only regroups identically named leaves matters
/// and every layout without bits equals [Layout::empty].
#[derive(Clone, Debug)]
pub enum Layout {
    Bits(u32),
    Struct(Vec<Field>),
    Array(Box<Layout>, u32),
}

impl Default for Layout {
    fn default() -> Self {
        Layout::empty()
    }
}

impl From<u32> for Layout {
    fn from(width: u32) -> Self {
        Layout::Bits(width)
    }
}

impl Layout {
    /// A struct without fields.
    pub fn empty() -> Self {
        Layout::Struct(vec![])
    }

    pub fn bits(width: u32) -> Self {
        Layout::Bits(width)
    }

    pub fn structure<I, N, L>(fields: I) -> Self
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<Id>,
        L: Into<Layout>,
    {
        Layout::Struct(
            fields
                .into_iter()
                .map(|(name, layout)| Field {
                    name: name.into(),
                    layout: layout.into(),
                })
                .collect(),
        )
    }

    pub fn array<L: Into<Layout>>(elem: L, len: u32) -> Self {
        Layout::Array(Box::new(elem.into()), len)
    }

    /// Total width in bits.
    pub fn width(&self) -> u32 {
        match self {
            Layout::Bits(w) => *w,
            Layout::Struct(fields) => {
                fields.iter().map(|f| f.layout.width()).sum()
            }
            Layout::Array(elem, len) => elem.width() * len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0
    }

    /// Fields of a struct layout; other layouts have none.
    pub fn fields(&self) -> &[Field] {
        match self {
            Layout::Struct(fields) => fields,
            _ => &[],
        }
    }

    /// Bit offset and layout of the field `name`.
    pub fn field(&self, name: Id) -> Option<(u32, &Layout)> {
        let mut offset = 0;
        for field in self.fields() {
            if field.name == name {
                return Some((offset, &field.layout));
            }
            offset += field.layout.width();
        }
        None
    }

    /// Bit offset and layout of element `idx` of an array layout.
    pub fn element(&self, idx: u32) -> Option<(u32, &Layout)> {
        match self {
            Layout::Array(elem, len) if idx < *len => {
                Some((idx * elem.width(), elem.as_ref()))
            }
            _ => None,
        }
    }

    /// Leaf paths with their widths, in bit order. Zero-width leaves carry no
    /// bits and are left out.
    pub fn flatten(&self) -> Vec<(String, u32)> {
        fn join(prefix: &str, rest: String) -> String {
            if rest.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}.{rest}")
            }
        }
        match self {
            Layout::Bits(0) => vec![],
            Layout::Bits(w) => vec![(String::new(), *w)],
            Layout::Struct(fields) => fields
                .iter()
                .flat_map(|f| {
                    f.layout
                        .flatten()
                        .into_iter()
                        .map(|(p, w)| (join(f.name.as_str(), p), w))
                })
                .collect(),
            Layout::Array(elem, len) => (0..*len)
                .flat_map(|i| {
                    elem.flatten()
                        .into_iter()
                        .map(move |(p, w)| (join(&i.to_string(), p), w))
                })
                .collect(),
        }
    }
}

impl PartialEq for Layout {
    fn eq(&self, other: &Self) -> bool {
        self.flatten() == other.flatten()
    }
}

impl Eq for Layout {}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Bits(w) => write!(f, "{w}"),
            Layout::Struct(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|fl| format!("{}: {}", fl.name, fl.layout))
                    .join(", ")
            ),
            Layout::Array(elem, len) => write!(f, "[{elem}; {len}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_offsets() {
        let layout = Layout::structure([
            ("a", Layout::bits(3)),
            ("b", Layout::array(2u32, 4)),
        ]);
        assert_eq!(layout.width(), 11);
        assert_eq!(layout.field(Id::new("b")).map(|(o, _)| o), Some(3));
        let (_, arr) = layout.field(Id::new("b")).unwrap();
        assert_eq!(arr.element(2).map(|(o, _)| o), Some(4));
        assert!(arr.element(4).is_none());
        assert_eq!(layout.to_string(), "{a: 3, b: [2; 4]}");
    }

    #[test]
    fn equality_is_structural() {
        let a = Layout::structure([("data", 8u32)]);
        let b = Layout::structure([("data", Layout::bits(8))]);
        let c = Layout::structure([("value", 8u32)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Layout::bits(8));
        assert_eq!(Layout::empty(), Layout::structure(Vec::<(&str, u32)>::new()));
    }

    #[test]
    fn zero_width_layouts_are_empty() {
        assert_eq!(Layout::from(0), Layout::empty());
        assert_eq!(Layout::structure([("a", 0u32)]), Layout::empty());
        assert_eq!(Layout::array(0u32, 3), Layout::bits(0));
        assert_eq!(
            Layout::structure([("a", 4u32), ("pad", 0u32)]),
            Layout::structure([("a", 4u32)])
        );
        assert_ne!(Layout::bits(0), Layout::bits(1));
    }
}
