//! Goods-tracking documents.
//!
//! The document set is closed: every variant the service can submit is listed
//! in [`Document`], and [`DocumentKind`] is the tag the route table is keyed
//! by. Field names follow the JSON accepted by the document-creation endpoint.

use crate::domain::route::{DestinationResolver, Routable};
use crate::domain::window::ConfigError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Endpoint that accepts goods-introduction documents.
pub const CREATE_DOCUMENT_URL: &str = "https://ismp.crpt.ru/api/v3/lk/documents/create";

/// Tag identifying a document variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Introduction into circulation of goods produced in the country
    LpIntroduceGoods,
}

/// Every document the service knows how to submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Document {
    IntroduceGoods(GoodsIntroduction),
}

impl Routable for Document {
    type Variant = DocumentKind;

    fn variant(&self) -> DocumentKind {
        match self {
            Document::IntroduceGoods(_) => DocumentKind::LpIntroduceGoods,
        }
    }
}

impl From<GoodsIntroduction> for Document {
    fn from(doc: GoodsIntroduction) -> Self {
        Document::IntroduceGoods(doc)
    }
}

/// Route table for the documents in this module.
pub fn default_routes() -> Result<DestinationResolver<DocumentKind>, ConfigError> {
    DestinationResolver::new([(DocumentKind::LpIntroduceGoods, CREATE_DOCUMENT_URL)])
}

/// Participant the document is filed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

/// Goods-introduction document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsIntroduction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    pub doc_id: String,
    pub doc_status: String,
    pub doc_type: DocumentKind,
    #[serde(rename = "importRequest")]
    pub import_request: bool,
    pub owner_inn: String,
    pub participant_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    pub production_type: String,
    #[serde(default)]
    pub products: Vec<Product>,
    pub reg_date: NaiveDate,
    pub reg_number: String,
}

/// One product line of a goods-introduction document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Product {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_document_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_document_number: Option<String>,
    pub owner_inn: String,
    pub producer_inn: String,
    pub production_date: Option<NaiveDate>,
    pub tnved_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uit_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uitu_code: Option<String>,
}
