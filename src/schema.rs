//! Space schemas
//!
//! A schema names a space, its key attribute and its typed attributes. The
//! client checks every operation against the schema before anything is sent.
//!
//! ## Text Form
//! ```text
//! space phonebook
//! key username
//! attributes first, last, int phone, set(string) tags
//! ```
//! Attributes without a type are strings. The key may carry a primitive type
//! (`key int k`). Trailing placement clauses (`subspace ...`, `create ...`,
//! `tolerate ...`) are accepted and ignored.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpaceError};
use crate::value::{Attributes, DataType, Primitive, Value};

/// One declared attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub datatype: DataType,
}

/// Description of a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    key: Attribute,
    attributes: Vec<Attribute>,
}

impl Schema {
    /// Start building a schema for `name`
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            key: None,
            attributes: Vec::new(),
        }
    }

    /// Parse the text form described in the module docs
    pub fn parse(description: &str) -> Result<Self> {
        Parser::new(description).parse()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_name(&self) -> &str {
        &self.key.name
    }

    pub fn key_type(&self) -> DataType {
        self.key.datatype
    }

    /// Non-key attributes in declaration order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Declared type of `name`, including the key attribute
    pub fn attribute_type(&self, name: &str) -> Option<DataType> {
        if name == self.key.name {
            return Some(self.key.datatype);
        }
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.datatype)
    }

    /// A fresh record: every non-key attribute at its zero value
    pub fn zero_record(&self) -> Attributes {
        self.attributes
            .iter()
            .map(|a| (a.name.clone(), a.datatype.zero()))
            .collect()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Resolve an attribute's type or fail with UnknownAttribute
    pub fn require(&self, name: &str) -> Result<DataType> {
        self.attribute_type(name)
            .ok_or_else(|| SpaceError::UnknownAttribute {
                space: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    pub fn validate_key(&self, key: &Value) -> Result<()> {
        if !self.key.datatype.conforms(key) {
            return Err(SpaceError::WrongType {
                attribute: self.key.name.clone(),
                message: format!("key must be {}, got {}", self.key.datatype, key.kind_name()),
            });
        }
        Ok(())
    }

    /// Check a put/condput payload: known non-key attributes, correct types
    pub fn validate_attributes(&self, attrs: &Attributes) -> Result<()> {
        for (name, value) in attrs {
            if *name == self.key.name {
                return Err(SpaceError::Validation(format!(
                    "Key attribute '{}' cannot be written as a value",
                    name
                )));
            }
            let datatype = self.require(name)?;
            if !datatype.conforms(value) {
                return Err(SpaceError::WrongType {
                    attribute: name.clone(),
                    message: format!("expected {}, got {}", datatype, value),
                });
            }
        }
        Ok(())
    }

    /// Check a projection list for get_partial
    pub fn validate_fields(&self, fields: &[String]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for field in fields {
            self.require(field)?;
            if !seen.insert(field.as_str()) {
                return Err(SpaceError::DuplicateAttribute(field.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "space {}", self.name)?;
        write!(f, "key {} {}", self.key.datatype, self.key.name)?;
        if !self.attributes.is_empty() {
            write!(f, "\nattributes ")?;
            for (i, a) in self.attributes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} {}", a.datatype, a.name)?;
            }
        }
        Ok(())
    }
}

/// Builder for Schema
pub struct SchemaBuilder {
    name: String,
    key: Option<Attribute>,
    attributes: Vec<Attribute>,
}

impl SchemaBuilder {
    /// Set the key attribute
    pub fn key(mut self, name: impl Into<String>, datatype: Primitive) -> Self {
        self.key = Some(Attribute {
            name: name.into(),
            datatype: datatype.into(),
        });
        self
    }

    /// Add a non-key attribute
    pub fn attribute(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            datatype,
        });
        self
    }

    pub fn build(self) -> Result<Schema> {
        if self.name.is_empty() {
            return Err(SpaceError::Validation("Space name is empty".to_string()));
        }
        let key = self
            .key
            .ok_or_else(|| SpaceError::Validation(format!("Space '{}' has no key", self.name)))?;

        let mut seen = BTreeSet::new();
        seen.insert(key.name.clone());
        for a in &self.attributes {
            if !seen.insert(a.name.clone()) {
                return Err(SpaceError::DuplicateAttribute(a.name.clone()));
            }
        }

        Ok(Schema {
            name: self.name,
            key,
            attributes: self.attributes,
        })
    }
}

// =============================================================================
// Text Parser
// =============================================================================

const TRAILING_CLAUSES: &[&str] = &["subspace", "create", "tolerate"];

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut word = String::new();
        for c in text.chars() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ',') {
                if !word.is_empty() {
                    tokens.push(std::mem::take(&mut word));
                }
                if !c.is_whitespace() {
                    tokens.push(c.to_string());
                }
            } else {
                word.push(c);
            }
        }
        if !word.is_empty() {
            tokens.push(word);
        }
        Self { tokens, pos: 0 }
    }

    fn peek(&self, ahead: usize) -> Option<&str> {
        self.tokens.get(self.pos + ahead).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, word: &str) -> Result<()> {
        match self.next() {
            Some(t) if t == word => Ok(()),
            Some(t) => Err(SpaceError::Validation(format!("Expected '{}', found '{}'", word, t))),
            None => Err(SpaceError::Validation(format!("Expected '{}', found end of input", word))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next() {
            Some(t) if is_ident(&t) => Ok(t),
            Some(t) => Err(SpaceError::Validation(format!("Expected a name, found '{}'", t))),
            None => Err(SpaceError::Validation("Expected a name, found end of input".to_string())),
        }
    }

    fn parse(mut self) -> Result<Schema> {
        self.expect("space")?;
        let name = self.ident()?;
        self.expect("key")?;

        let (key_type, key_name) = self.declaration()?;
        let key_type = key_type.primitive().ok_or_else(|| {
            SpaceError::Validation(format!("Key '{}' must have a primitive type", key_name))
        })?;
        let mut builder = Schema::builder(name).key(key_name, key_type);

        if self.peek(0) == Some("attributes") {
            self.pos += 1;
            loop {
                let (datatype, attr) = self.declaration()?;
                builder = builder.attribute(attr, datatype);
                if self.peek(0) == Some(",") {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        match self.peek(0) {
            None => {}
            Some(t) if TRAILING_CLAUSES.contains(&t) => {
                tracing::debug!("Ignoring placement clause starting at '{}'", t);
            }
            Some(t) => {
                return Err(SpaceError::Validation(format!("Unexpected '{}' in space description", t)));
            }
        }

        builder.build()
    }

    /// `[type] name`, where a missing type means string
    fn declaration(&mut self) -> Result<(DataType, String)> {
        let typed = match (self.peek(1), self.peek(2)) {
            (Some("("), _) => true,
            (Some(next), _) if is_ident(next) && !is_keyword(next) => true,
            _ => false,
        };
        if !typed {
            return Ok((DataType::String, self.ident()?));
        }

        let mut text = self.next().unwrap_or_default();
        if self.peek(0) == Some("(") {
            while let Some(t) = self.next() {
                text.push_str(&t);
                if t == ")" {
                    break;
                }
            }
        }
        let datatype = text.parse::<DataType>()?;
        Ok((datatype, self.ident()?))
    }
}

fn is_ident(token: &str) -> bool {
    !token.is_empty() && !matches!(token, "(" | ")" | ",")
}

fn is_keyword(token: &str) -> bool {
    token == "attributes" || TRAILING_CLAUSES.contains(&token)
}
