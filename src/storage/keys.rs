//! Record keys - composite `<namespace>|<owner>|<index>` strings
//!
//! Layout:
//! - `h|FILE_NAME|3` header attribute
//! - `i|12|0` entity attribute, `i|12|_` entity declaration index
//! - `t|77|0` defined-type instance attribute, `t|77|_` its declaration index
//! - `t|5` type index (ids of entities whose exact type is declaration 5)
//! - `v|12|5|3` inverse index (ids of declaration-5 entities referencing #12 at slot 3)
//! - `g|2O2Fr$t4X7Zf8NOew3FLOH` guid index

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Whose attributes a record holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordOwner {
    /// Header record, by declaration name
    Header(String),
    /// Entity instance, by store id
    Entity(u32),
    /// Defined-type instance, by identity
    Type(u64),
}

impl RecordOwner {
    fn write_prefix(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            RecordOwner::Header(name) => write!(f, "h|{}|", name),
            RecordOwner::Entity(id) => write!(f, "i|{}|", id),
            RecordOwner::Type(identity) => write!(f, "t|{}|", identity),
        }
    }

    /// Prefix shared by every record of this owner, e.g. `i|12|`.
    pub fn prefix(&self) -> String {
        let mut s = String::new();
        let _ = self.write_prefix(&mut s);
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Attribute { owner: RecordOwner, slot: usize },
    Declaration(RecordOwner),
    TypeIndex(usize),
    Inverse { target: u32, declaration: usize, attribute: usize },
    Guid(String),
}

impl RecordKey {
    pub fn attribute(owner: RecordOwner, slot: usize) -> Self {
        RecordKey::Attribute { owner, slot }
    }

    /// Prefix of all inverse records naming `target`.
    pub fn inverse_prefix(target: u32) -> String {
        format!("v|{}|", target)
    }

    pub fn to_key_string(&self) -> String {
        self.to_string()
    }

    /// Parse a key string back into its components.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = || Error::CorruptRecord(format!("Invalid record key '{}'", key));
        let number = |s: &str| s.parse::<u64>().map_err(|_| invalid());

        let (namespace, rest) = key.split_once('|').ok_or_else(invalid)?;
        match namespace {
            "h" => {
                let (name, slot) = rest.rsplit_once('|').ok_or_else(invalid)?;
                Ok(RecordKey::Attribute {
                    owner: RecordOwner::Header(name.to_string()),
                    slot: number(slot)? as usize,
                })
            }
            "i" | "t" => match rest.split_once('|') {
                None if namespace == "t" => Ok(RecordKey::TypeIndex(number(rest)? as usize)),
                None => Err(invalid()),
                Some((owner, slot)) => {
                    let owner = if namespace == "i" {
                        RecordOwner::Entity(u32::try_from(number(owner)?).map_err(|_| invalid())?)
                    } else {
                        RecordOwner::Type(number(owner)?)
                    };
                    if slot == "_" {
                        Ok(RecordKey::Declaration(owner))
                    } else {
                        Ok(RecordKey::Attribute { owner, slot: number(slot)? as usize })
                    }
                }
            },
            "v" => {
                let mut parts = rest.splitn(3, '|');
                let mut next = || parts.next().ok_or_else(invalid).and_then(number);
                let target = u32::try_from(next()?).map_err(|_| invalid())?;
                let declaration = next()? as usize;
                let attribute = next()? as usize;
                Ok(RecordKey::Inverse { target, declaration, attribute })
            }
            "g" => Ok(RecordKey::Guid(rest.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Attribute { owner, slot } => {
                owner.write_prefix(f)?;
                write!(f, "{}", slot)
            }
            RecordKey::Declaration(owner) => {
                owner.write_prefix(f)?;
                f.write_str("_")
            }
            RecordKey::TypeIndex(decl) => write!(f, "t|{}", decl),
            RecordKey::Inverse { target, declaration, attribute } => {
                write!(f, "v|{}|{}|{}", target, declaration, attribute)
            }
            RecordKey::Guid(guid) => write!(f, "g|{}", guid),
        }
    }
}

impl FromStr for RecordKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strings() {
        assert_eq!(RecordKey::attribute(RecordOwner::Entity(12), 3).to_string(), "i|12|3");
        assert_eq!(RecordKey::Declaration(RecordOwner::Type(7)).to_string(), "t|7|_");
        assert_eq!(RecordKey::TypeIndex(5).to_string(), "t|5");
        assert_eq!(
            RecordKey::Inverse { target: 12, declaration: 5, attribute: 3 }.to_string(),
            "v|12|5|3"
        );
        assert_eq!(
            RecordKey::attribute(RecordOwner::Header("FILE_NAME".into()), 1).to_string(),
            "h|FILE_NAME|1"
        );
        assert_eq!(RecordOwner::Entity(12).prefix(), "i|12|");
        assert_eq!(RecordKey::inverse_prefix(12), "v|12|");
    }

    #[test]
    fn test_key_parse() {
        assert_eq!(
            RecordKey::parse("i|12|_").unwrap(),
            RecordKey::Declaration(RecordOwner::Entity(12))
        );
        assert_eq!(RecordKey::parse("t|5").unwrap(), RecordKey::TypeIndex(5));
        assert_eq!(
            RecordKey::parse("t|9|0").unwrap(),
            RecordKey::attribute(RecordOwner::Type(9), 0)
        );
        assert_eq!(
            RecordKey::parse("v|1|2|3").unwrap(),
            RecordKey::Inverse { target: 1, declaration: 2, attribute: 3 }
        );
        assert_eq!(RecordKey::parse("g|abc").unwrap(), RecordKey::Guid("abc".into()));
        assert_eq!(
            "h|FILE_SCHEMA|0".parse::<RecordKey>().unwrap(),
            RecordKey::attribute(RecordOwner::Header("FILE_SCHEMA".into()), 0)
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(RecordKey::parse("x|1").is_err());
        assert!(RecordKey::parse("i|1").is_err());
        assert!(RecordKey::parse("v|1|2").is_err());
        assert!(RecordKey::parse("i|abc|0").is_err());
        assert!(RecordKey::parse("nobar").is_err());
    }
}
