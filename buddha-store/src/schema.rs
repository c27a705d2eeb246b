//! Collections and their property schemas.

use std::fmt;

/// Property data types understood by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Int,
    Number,
    Boolean,
    Date,
    Uuid,
}

impl DataType {
    /// Weaviate `dataType` name.
    pub fn weaviate_name(self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Int => "int",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Uuid => "uuid",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub name: &'static str,
    pub data_type: DataType,
}

const fn prop(name: &'static str, data_type: DataType) -> Property {
    Property { name, data_type }
}

const DOCUMENTS: &[Property] = &[prop("title", DataType::Text), prop("content", DataType::Text)];

const MESSAGES: &[Property] = &[
    prop("session_id", DataType::Text),
    prop("content", DataType::Text),
    prop("role", DataType::Text),
    prop("created_at", DataType::Date),
];

const USERS: &[Property] = &[
    prop("email", DataType::Text),
    prop("password", DataType::Text),
    prop("name", DataType::Text),
    prop("created_at", DataType::Date),
    prop("updated_at", DataType::Date),
];

const SECTIONS: &[Property] = &[
    prop("title", DataType::Text),
    prop("order", DataType::Int),
    prop("created_at", DataType::Date),
    prop("updated_at", DataType::Date),
    prop("author", DataType::Text),
];

const AGENTS: &[Property] = &[
    prop("name", DataType::Text),
    prop("description", DataType::Text),
    prop("system_prompt", DataType::Text),
    prop("tools", DataType::Text),
    prop("model", DataType::Text),
    prop("temperature", DataType::Number),
    prop("created_at", DataType::Date),
    prop("updated_at", DataType::Date),
    prop("author", DataType::Text),
    prop("status", DataType::Text),
];

const TOKEN_BLACKLIST: &[Property] = &[
    prop("token", DataType::Text),
    prop("user_id", DataType::Text),
    prop("blacklisted_at", DataType::Date),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Documents,
    Messages,
    Users,
    Sections,
    Agents,
    TokenBlacklist,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Documents,
        Collection::Messages,
        Collection::Users,
        Collection::Sections,
        Collection::Agents,
        Collection::TokenBlacklist,
    ];

    /// Class name as stored in the vector database.
    pub fn class_name(self) -> &'static str {
        match self {
            Collection::Documents => "Documents",
            Collection::Messages => "Messages",
            Collection::Users => "Users",
            Collection::Sections => "Sections",
            Collection::Agents => "Agents",
            Collection::TokenBlacklist => "TokenBlacklist",
        }
    }

    /// Whether objects get an embedding (and can be searched with `near_text`).
    pub fn vectorized(self) -> bool {
        !matches!(self, Collection::Users | Collection::TokenBlacklist)
    }

    pub fn properties(self) -> &'static [Property] {
        match self {
            Collection::Documents => DOCUMENTS,
            Collection::Messages => MESSAGES,
            Collection::Users => USERS,
            Collection::Sections => SECTIONS,
            Collection::Agents => AGENTS,
            Collection::TokenBlacklist => TOKEN_BLACKLIST,
        }
    }

    pub fn data_type(self, property: &str) -> Option<DataType> {
        self.properties()
            .iter()
            .find(|p| p.name == property)
            .map(|p| p.data_type)
    }

    /// Text properties, in schema order. These feed the vectorizer.
    pub fn text_properties(self) -> impl Iterator<Item = &'static str> {
        self.properties()
            .iter()
            .filter(|p| p.data_type == DataType::Text)
            .map(|p| p.name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}
