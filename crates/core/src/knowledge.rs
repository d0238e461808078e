//! The structured family profile collected during onboarding.
//!
//! `Knowledge` is what personalizes every downstream generation step: the
//! onboarding flow fills it in one question at a time, and refuses to
//! finish while any load-bearing field is still absent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// City/country pair. Street-level detail is intentionally never collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Profile of one person (the parent or the child).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonEntry {
    pub name: Option<String>,
    pub age: Option<u8>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
}

/// Everything the assistant knows about the family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub parent: Option<PersonEntry>,
    #[serde(default)]
    pub child: Option<PersonEntry>,
    /// Preferred story theme. Optional: onboarding does not insist on it,
    /// but the first interactive story turn needs one.
    #[serde(default)]
    pub theme: Option<String>,
}

/// A load-bearing field that is still unpopulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Address,
    Parent,
    Child,
    ParentAge,
    ParentLikes,
    ParentDislikes,
    ChildAge,
    ChildLikes,
    ChildDislikes,
}

impl MissingField {
    /// A plain question to ask when the question-generation capability has
    /// run out of ideas but this field is still empty.
    pub fn fallback_question(self) -> &'static str {
        match self {
            MissingField::Address => "Which city and country do you live in?",
            MissingField::Parent => "What is your name?",
            MissingField::Child => "What is your child's name?",
            MissingField::ParentAge => "How old are you?",
            MissingField::ParentLikes => "What are some things you enjoy?",
            MissingField::ParentDislikes => "Is there anything you dislike?",
            MissingField::ChildAge => "How old is your child?",
            MissingField::ChildLikes => "What does your child enjoy?",
            MissingField::ChildDislikes => "Is there anything your child dislikes?",
        }
    }
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingField::Address => "address",
            MissingField::Parent => "parent",
            MissingField::Child => "child",
            MissingField::ParentAge => "parent age",
            MissingField::ParentLikes => "parent likes",
            MissingField::ParentDislikes => "parent dislikes",
            MissingField::ChildAge => "child age",
            MissingField::ChildLikes => "child likes",
            MissingField::ChildDislikes => "child dislikes",
        };
        f.write_str(name)
    }
}

impl Knowledge {
    /// Lists every load-bearing field that is still absent, in the order
    /// the onboarding flow should chase them.
    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();

        match &self.address {
            Some(addr) if addr.city.is_some() && addr.country.is_some() => {}
            _ => missing.push(MissingField::Address),
        }

        match &self.parent {
            None => missing.push(MissingField::Parent),
            Some(parent) => {
                if parent.age.is_none() {
                    missing.push(MissingField::ParentAge);
                }
                if parent.likes.is_empty() {
                    missing.push(MissingField::ParentLikes);
                }
                if parent.dislikes.is_empty() {
                    missing.push(MissingField::ParentDislikes);
                }
            }
        }

        match &self.child {
            None => missing.push(MissingField::Child),
            Some(child) => {
                if child.age.is_none() {
                    missing.push(MissingField::ChildAge);
                }
                if child.likes.is_empty() {
                    missing.push(MissingField::ChildLikes);
                }
                if child.dislikes.is_empty() {
                    missing.push(MissingField::ChildDislikes);
                }
            }
        }

        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// A fully populated profile used when onboarding is bypassed via
    /// configuration (demo and test runs).
    pub fn preset() -> Self {
        Self {
            address: Some(Address {
                country: Some("Netherlands".to_string()),
                city: Some("Amsterdam".to_string()),
            }),
            parent: Some(PersonEntry {
                name: Some("Alex".to_string()),
                age: Some(38),
                likes: vec!["reading aloud".to_string(), "cycling".to_string()],
                dislikes: vec!["loud cartoons".to_string()],
            }),
            child: Some(PersonEntry {
                name: Some("Mila".to_string()),
                age: Some(6),
                likes: vec!["dinosaurs".to_string(), "drawing".to_string()],
                dislikes: vec!["broccoli".to_string()],
            }),
            theme: Some("a brave little turtle who wants to explore the world".to_string()),
        }
    }
}
