//! Entity resolution
//!
//! A name-to-replacement-text table with a parent chain, so layered tables
//! (document-declared entities over an HTML table over the XML defaults)
//! resolve with child-shadows-parent semantics. Also hosts numeric
//! character-reference expansion and the standard XML escaping helpers.
//!
//! The core ships only the five predefined XML entities; larger tables
//! (e.g. HTML) are supplied by collaborators and installed as parents.

use crate::core::chars::CharValidator;
use crate::error::EntityError;
use memchr::memchr;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// The five predefined XML entities
const PREDEFINED: [(&str, &str); 5] = [
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("quot", "\""),
    ("apos", "'"),
];

/// Name → replacement-text table with a parent chain
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    entities: HashMap<String, String>,
    parent: Option<Arc<EntityResolver>>,
    validator: CharValidator,
}

impl EntityResolver {
    /// An empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver seeded with the five predefined XML entities
    pub fn xml() -> Self {
        let mut resolver = Self::new();
        for (name, text) in PREDEFINED {
            resolver.add(name, text);
        }
        resolver
    }

    /// Install a parent resolver; local entries shadow the parent
    pub fn with_parent(mut self, parent: Arc<EntityResolver>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Replace the character validator used for numeric references
    pub fn with_validator(mut self, validator: CharValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Define or redefine an entity
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.entities.insert(name.into(), text.into());
    }

    /// Look up a name through the parent chain
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match self.entities.get(name) {
            Some(text) => Some(text),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }

    /// Whether the chain defines `name`
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Resolve a name to its replacement text; a miss at the end of the
    /// chain is an error
    pub fn resolve(&self, name: &str) -> Result<&str, EntityError> {
        self.lookup(name)
            .ok_or_else(|| EntityError::NotDefined(name.to_string()))
    }

    /// Expand a reference to its replacement text
    ///
    /// Accepts a bare name or a full `&name;` / `&#N;` / `&#xN;` reference.
    /// Returns `Ok(None)` for a well-formed named reference that is not
    /// defined anywhere in the chain; numeric references are decoded,
    /// validated and re-encoded.
    pub fn expand(&self, reference: &str) -> Result<Option<String>, EntityError> {
        let inner = strip_reference(reference)?;
        if inner.starts_with('#') {
            return self.expand_numeric(reference).map(Some);
        }
        Ok(self.lookup(inner).map(str::to_string))
    }

    /// Expand a numeric character reference (`&#N;`, `&#xN;`, or the bare
    /// `#N` forms) to the referenced character
    pub fn expand_numeric(&self, reference: &str) -> Result<String, EntityError> {
        expand_numeric_reference(reference, self.validator)
    }
}

/// Strip `&`/`;` delimiters off a reference, leaving a bare name or `#...`
fn strip_reference(reference: &str) -> Result<&str, EntityError> {
    if let Some(rest) = reference.strip_prefix('&') {
        rest.strip_suffix(';')
            .ok_or_else(|| EntityError::MissingSemicolon(reference.to_string()))
    } else {
        Ok(reference)
    }
}

/// Decode, validate and re-encode a numeric character reference
pub fn expand_numeric_reference(
    reference: &str,
    validator: CharValidator,
) -> Result<String, EntityError> {
    let inner = strip_reference(reference)?;
    let digits = inner.strip_prefix('#').unwrap_or(inner);

    if digits.is_empty() {
        return Err(EntityError::MissingNumber(reference.to_string()));
    }
    if let Some(negative) = digits.strip_prefix('-') {
        // Cite the literal negative value, not the whole reference
        let mut value = String::from("-");
        value.push_str(negative);
        return Err(EntityError::NegativeValue(value));
    }

    let value = if let Some(hex) = digits.strip_prefix(['x', 'X']) {
        if hex.is_empty() {
            return Err(EntityError::MissingNumber(reference.to_string()));
        }
        u64::from_str_radix(hex, 16)
            .map_err(|_| EntityError::MalformedNumber(reference.to_string()))?
    } else {
        digits
            .parse::<u64>()
            .map_err(|_| EntityError::MalformedNumber(reference.to_string()))?
    };

    if value > 0x10FFFF {
        return Err(EntityError::OutOfRange(digits.to_string()));
    }
    let value = value as u32;
    if validator.check_scalar(value).is_some() {
        return Err(EntityError::ForbiddenCharacter(value));
    }
    // Surrogate values never survive char conversion, with or without
    // checking; they cannot be represented in the output text
    let c = char::from_u32(value).ok_or(EntityError::ForbiddenCharacter(value))?;
    Ok(c.to_string())
}

/// Escape `& < > " '` for XML output
///
/// Not idempotent by design: escaping already-escaped text double-escapes
/// the ampersand.
pub fn escape(input: &str) -> Cow<'_, str> {
    if !input
        .bytes()
        .any(|b| matches!(b, b'&' | b'<' | b'>' | b'"' | b'\''))
    {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Replace the five predefined entity references with their characters
///
/// Unknown references and bare ampersands are left untouched.
pub fn unescape(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        result.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let mut replaced = false;
        for (name, text) in PREDEFINED {
            let candidate = &rest[1..];
            if candidate.starts_with(name) && candidate[name.len()..].starts_with(';') {
                result.push_str(text);
                rest = &candidate[name.len() + 1..];
                replaced = true;
                break;
            }
        }
        if !replaced {
            result.push('&');
            rest = &rest[1..];
        }
    }
    result.push_str(rest);
    Cow::Owned(result)
}
