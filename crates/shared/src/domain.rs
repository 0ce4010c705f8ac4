use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(QuestionId);
id_newtype!(FormId);
id_newtype!(LibraryRef);

/// Prefix carried by every locally generated question id.
pub const EPHEMERAL_PREFIX: &str = "tmp_";

impl QuestionId {
    /// Fresh id for a question that has never been persisted.
    pub fn ephemeral() -> Self {
        Self(format!("{EPHEMERAL_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Fresh storage-grade id, minted during reconciliation.
    pub fn permanent() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn is_ephemeral(&self) -> bool {
        self.0.starts_with(EPHEMERAL_PREFIX)
    }
}

impl FormId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

pub const PLACEHOLDER_OPTION: &str = "Option 1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("choice questions need at least one option")]
pub struct EmptyOptionsError;

/// Ordered answer choices; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ChoiceOptions(Vec<String>);

impl ChoiceOptions {
    pub fn new(options: Vec<String>) -> Result<Self, EmptyOptionsError> {
        if options.is_empty() {
            return Err(EmptyOptionsError);
        }
        Ok(Self(options))
    }

    pub fn placeholder() -> Self {
        Self(vec![PLACEHOLDER_OPTION.to_string()])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn push(&mut self, option: impl Into<String>) {
        self.0.push(option.into());
    }

    /// Returns false when `index` is out of range.
    pub fn set(&mut self, index: usize, option: impl Into<String>) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = option.into();
                true
            }
            None => false,
        }
    }

    /// Refuses to remove the last remaining option.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.0.len() <= 1 || index >= self.0.len() {
            return false;
        }
        self.0.remove(index);
        true
    }
}

impl TryFrom<Vec<String>> for ChoiceOptions {
    type Error = EmptyOptionsError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChoiceOptions> for Vec<String> {
    fn from(value: ChoiceOptions) -> Self {
        value.0
    }
}

/// Field kind of a question. Choice-like kinds carry their options inline so
/// a choice question without options cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    ShortText,
    Email,
    LongText,
    Phone,
    Url,
    Number,
    Date,
    YesNo,
    SingleChoice { options: ChoiceOptions },
    MultiChoice { options: ChoiceOptions },
    Dropdown { options: ChoiceOptions },
    Rating { options: ChoiceOptions },
    File,
}

impl FieldKind {
    pub fn tag(&self) -> KindTag {
        match self {
            Self::ShortText => KindTag::ShortText,
            Self::Email => KindTag::Email,
            Self::LongText => KindTag::LongText,
            Self::Phone => KindTag::Phone,
            Self::Url => KindTag::Url,
            Self::Number => KindTag::Number,
            Self::Date => KindTag::Date,
            Self::YesNo => KindTag::YesNo,
            Self::SingleChoice { .. } => KindTag::SingleChoice,
            Self::MultiChoice { .. } => KindTag::MultiChoice,
            Self::Dropdown { .. } => KindTag::Dropdown,
            Self::Rating { .. } => KindTag::Rating,
            Self::File => KindTag::File,
        }
    }

    pub fn options(&self) -> Option<&ChoiceOptions> {
        match self {
            Self::SingleChoice { options }
            | Self::MultiChoice { options }
            | Self::Dropdown { options }
            | Self::Rating { options } => Some(options),
            _ => None,
        }
    }

    pub fn options_mut(&mut self) -> Option<&mut ChoiceOptions> {
        match self {
            Self::SingleChoice { options }
            | Self::MultiChoice { options }
            | Self::Dropdown { options }
            | Self::Rating { options } => Some(options),
            _ => None,
        }
    }

    /// Builds the kind for `tag`. Choice kinds reuse `carried` options when
    /// present and fall back to the placeholder list otherwise.
    pub fn from_tag(tag: KindTag, carried: Option<ChoiceOptions>) -> Self {
        let options = || carried.clone().unwrap_or_else(ChoiceOptions::placeholder);
        match tag {
            KindTag::ShortText => Self::ShortText,
            KindTag::Email => Self::Email,
            KindTag::LongText => Self::LongText,
            KindTag::Phone => Self::Phone,
            KindTag::Url => Self::Url,
            KindTag::Number => Self::Number,
            KindTag::Date => Self::Date,
            KindTag::YesNo => Self::YesNo,
            KindTag::SingleChoice => Self::SingleChoice { options: options() },
            KindTag::MultiChoice => Self::MultiChoice { options: options() },
            KindTag::Dropdown => Self::Dropdown { options: options() },
            KindTag::Rating => Self::Rating { options: options() },
            KindTag::File => Self::File,
        }
    }
}

/// Payload-free discriminant of [`FieldKind`], used when picking a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindTag {
    ShortText,
    Email,
    LongText,
    Phone,
    Url,
    Number,
    Date,
    YesNo,
    SingleChoice,
    MultiChoice,
    Dropdown,
    Rating,
    File,
}

impl KindTag {
    pub const ALL: [KindTag; 13] = [
        KindTag::ShortText,
        KindTag::Email,
        KindTag::LongText,
        KindTag::Phone,
        KindTag::Url,
        KindTag::Number,
        KindTag::Date,
        KindTag::YesNo,
        KindTag::SingleChoice,
        KindTag::MultiChoice,
        KindTag::Dropdown,
        KindTag::Rating,
        KindTag::File,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortText => "short_text",
            Self::Email => "email",
            Self::LongText => "long_text",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Number => "number",
            Self::Date => "date",
            Self::YesNo => "yes_no",
            Self::SingleChoice => "single_choice",
            Self::MultiChoice => "multi_choice",
            Self::Dropdown => "dropdown",
            Self::Rating => "rating",
            Self::File => "file",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ShortText => "Short Text",
            Self::Email => "Email",
            Self::LongText => "Long Text",
            Self::Phone => "Phone",
            Self::Url => "Website URL",
            Self::Number => "Number",
            Self::Date => "Date",
            Self::YesNo => "Yes/No",
            Self::SingleChoice => "Multiple Choice",
            Self::MultiChoice => "Checkboxes",
            Self::Dropdown => "Dropdown",
            Self::Rating => "Rating",
            Self::File => "File Upload",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ShortText => "Single line text input",
            Self::Email => "Email address",
            Self::LongText => "Multi-line text area",
            Self::Phone => "Phone number",
            Self::Url => "Web address",
            Self::Number => "Numeric input",
            Self::Date => "Date picker",
            Self::YesNo => "Binary choice",
            Self::SingleChoice => "Select one option",
            Self::MultiChoice => "Select multiple options",
            Self::Dropdown => "Dropdown menu",
            Self::Rating => "Star rating (1-5)",
            Self::File => "Upload files",
        }
    }

    pub fn is_choice(self) -> bool {
        matches!(
            self,
            Self::SingleChoice | Self::MultiChoice | Self::Dropdown | Self::Rating
        )
    }

    /// Kinds whose label or tag contains `filter`, ignoring case.
    pub fn matching(filter: &str) -> Vec<KindTag> {
        let filter = filter.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .filter(|tag| {
                tag.label().to_lowercase().contains(&filter) || tag.as_str().contains(&filter)
            })
            .collect()
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    All,
    Any,
}

impl Combinator {
    pub fn toggled(self) -> Self {
        match self {
            Self::All => Self::Any,
            Self::Any => Self::All,
        }
    }

    pub fn joiner(self) -> &'static str {
        match self {
            Self::All => " AND ",
            Self::Any => " OR ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Is,
    IsNot,
    Contains,
    NotContains,
    Gt,
    Lt,
    Answered,
    NotAnswered,
}

impl Operator {
    pub fn phrase(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::Contains => "contains",
            Self::NotContains => "does not contain",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Answered => "is answered",
            Self::NotAnswered => "is not answered",
        }
    }

    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Answered | Self::NotAnswered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicRule {
    pub left_question_id: QuestionId,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl LogicRule {
    pub fn new(left_question_id: QuestionId, operator: Operator, value: Option<String>) -> Self {
        Self {
            left_question_id,
            operator,
            value,
        }
    }
}

/// Visibility guard of a question. No rules means always visible.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogicGroup {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub rules: Vec<LogicRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub order_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<LogicGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_ref: Option<LibraryRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<serde_json::Value>,
}

impl Question {
    pub fn new(id: QuestionId, kind: FieldKind, order_index: usize) -> Self {
        Self {
            id,
            kind,
            label: String::new(),
            description: None,
            placeholder: None,
            required: false,
            order_index,
            logic: None,
            library_ref: None,
            validation: None,
        }
    }

    pub fn kind_tag(&self) -> KindTag {
        self.kind.tag()
    }

    pub fn options(&self) -> Option<&[String]> {
        self.kind.options().map(ChoiceOptions::as_slice)
    }
}
