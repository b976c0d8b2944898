use serde::{Deserialize, Serialize};

/// Per-module documentation summary as served by the registry's
/// `docs.json`, reduced to names and signatures.
///
/// The registry payload carries a free-text `comment` on the module and on
/// every member; tens of thousands of cached packages make those comments
/// the dominant memory cost, so the decode drops them. Serde skips unknown
/// fields by default, which is exactly the stripping we want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDoc {
    pub name: String,
    #[serde(default)]
    pub unions: Vec<UnionDoc>,
    #[serde(default)]
    pub aliases: Vec<AliasDoc>,
    #[serde(default)]
    pub values: Vec<ValueDoc>,
    #[serde(default)]
    pub binops: Vec<BinopDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionDoc {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cases: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDoc {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "type")]
    pub type_signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinopDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_signature: String,
}
