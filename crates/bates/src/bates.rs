use crate::{Error, Result};
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// A prefixed, zero-padded sequence identifier stamped on document pages.
///
/// A `BatesNumber` is an immutable value: [`next`](Self::next) and
/// [`previous`](Self::previous) return new instances. The rendered form is
/// the prefix followed by the number padded with zeros to `padding` digits.
/// Numbers wider than `padding` are rendered in full.
///
/// # Ordering
///
/// Equality, hashing and ordering are defined on the rendered string only.
/// With a shared prefix and padding this matches numeric order, but values
/// of different widths compare textually: `A2` sorts after `A010`, and
/// `BatesNumber::new("A", 12, 0)` equals `BatesNumber::new("A1", 2, 1)`
/// because both render as `A12`. This is intentional.
///
/// # Example
///
/// ```
/// use bates::BatesNumber;
///
/// let first = BatesNumber::with_prefix("X_");
/// assert_eq!(first.format(), "X_00000001");
/// assert_eq!(first.next().unwrap().format(), "X_00000002");
/// ```
#[derive(Clone)]
pub struct BatesNumber {
    prefix: String,
    number: u64,
    padding: usize,
    rendered: String,
}

impl BatesNumber {
    /// Default zero-padding width.
    pub const DEFAULT_PADDING: usize = 8;

    /// Creates a Bates number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequenceValue`] if `number` is 0.
    pub fn new(prefix: impl Into<String>, number: u64, padding: usize) -> Result<Self> {
        if number < 1 {
            return Err(Error::InvalidSequenceValue { number });
        }
        let prefix = prefix.into();
        let rendered = format!("{prefix}{number:0padding$}");
        Ok(Self {
            prefix,
            number,
            padding,
            rendered,
        })
    }

    /// Creates the first Bates number for `prefix` with the default padding.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let rendered = format!("{prefix}{:0width$}", 1, width = Self::DEFAULT_PADDING);
        Self {
            prefix,
            number: 1,
            padding: Self::DEFAULT_PADDING,
            rendered,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub const fn number(&self) -> u64 {
        self.number
    }

    pub const fn padding(&self) -> usize {
        self.padding
    }

    /// Returns the rendered identifier, e.g. `TEST_00000042`.
    pub fn format(&self) -> &str {
        &self.rendered
    }

    /// Returns the following Bates number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SequenceExhausted`] when called on `u64::MAX`.
    pub fn next(&self) -> Result<Self> {
        let number = self
            .number
            .checked_add(1)
            .ok_or(Error::SequenceExhausted {
                number: self.number,
            })?;
        let padding = self.padding;
        Ok(Self {
            prefix: self.prefix.clone(),
            number,
            padding,
            rendered: format!("{}{number:0padding$}", self.prefix),
        })
    }

    /// Returns the preceding Bates number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequenceValue`] when called on number 1.
    pub fn previous(&self) -> Result<Self> {
        Self::new(self.prefix.clone(), self.number - 1, self.padding)
    }

    /// Yields `self`, then every following number up to `u64::MAX`.
    ///
    /// Annotators zip this with the pages of a document so the numbers of a
    /// single file are contiguous.
    pub fn sequence(&self) -> impl Iterator<Item = Self> + use<> {
        core::iter::successors(Some(self.clone()), |bates| bates.next().ok())
    }
}

impl fmt::Display for BatesNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl fmt::Debug for BatesNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl PartialEq for BatesNumber {
    fn eq(&self, other: &Self) -> bool {
        self.rendered == other.rendered
    }
}

impl Eq for BatesNumber {}

impl Hash for BatesNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
    }
}

impl PartialOrd for BatesNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BatesNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rendered.cmp(&other.rendered)
    }
}
