use {
    crate::{
        catalog::{Catalog, CatalogEntry},
        order_log::Params,
    },
    quick_xml::se::Serializer,
    serde::Serialize,
    std::borrow::Cow,
};

pub const CONTENT_TYPE: &str = "application/xml; charset=utf-8";

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, thiserror::Error)]
#[error("unable to render purchase response: {0}")]
pub struct RenderError(String);

/// What the client asked for, pulled out of the query string and form body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub product_id: String,
    pub email: String,
}

impl PurchaseRequest {
    /// The store client has sent both spellings of the product key over the
    /// years; form values win over query values, lowercase over capitalized.
    pub fn from_params(query: &Params, form: &Params) -> Self {
        let product_id = param(form, "pid")
            .or_else(|| param(query, "pid"))
            .or_else(|| param(form, "Pid"))
            .or_else(|| param(query, "Pid"))
            .unwrap_or_default();

        let email = param(form, "email")
            .or_else(|| param(query, "email"))
            .unwrap_or_default();

        Self {
            product_id: product_id.to_string(),
            email: email.to_string(),
        }
    }
}

fn param<'p>(params: &'p Params, key: &str) -> Option<&'p str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<'a> {
    Purchased {
        entry: &'a CatalogEntry,
        download_url: &'a str,
    },
    NotFound {
        product_id: &'a str,
    },
}

impl<'a> Outcome<'a> {
    pub fn resolve(catalog: &'a Catalog, request: &'a PurchaseRequest) -> Self {
        let product_id = request.product_id.as_str();

        catalog
            .find(product_id)
            .and_then(|entry| {
                entry
                    .download_url()
                    .map(|download_url| Outcome::Purchased { entry, download_url })
            })
            .unwrap_or(Outcome::NotFound { product_id })
    }

    pub fn is_purchased(&self) -> bool {
        matches!(self, Outcome::Purchased { .. })
    }

    pub fn to_xml(&self) -> Result<String, RenderError> {
        let document = match self {
            Outcome::Purchased { entry, download_url } => Document {
                status: "OK",
                status_description: "Purchase successful".to_string(),
                download_url: Some(xml_chars(download_url)),
                external: Some(0),
                product_id: Some(xml_chars(&entry.id)),
                product_name: Some(xml_chars(&entry.name)),
                customer_message: Some("Thank you for your download!"),
            },
            Outcome::NotFound { product_id } => Document {
                status: "Error",
                status_description: format!("Product not found: {}", xml_chars(product_id)),
                download_url: None,
                external: None,
                product_id: None,
                product_name: None,
                customer_message: None,
            },
        };

        let mut body = String::from(XML_DECLARATION);

        let mut serializer = Serializer::new(&mut body);
        serializer.indent(' ', 2);

        document
            .serialize(serializer)
            .map_err(|error| RenderError(error.to_string()))?;

        Ok(body)
    }
}

/// Replaces characters XML 1.0 cannot carry at all, escaped or not, with
/// U+FFFD. Markup characters are left for the serializer to escape.
fn xml_chars(text: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        match c {
            '\t' | '\n' | '\r' => true,
            '\u{fffe}' | '\u{ffff}' => false,
            c => c >= '\u{20}',
        }
    }

    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if allowed(c) { c } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        )
    }
}

#[derive(Serialize)]
#[serde(rename = "response")]
struct Document<'a> {
    status: &'a str,

    #[serde(rename = "statusDescription")]
    status_description: String,

    #[serde(rename = "downloadURL", skip_serializing_if = "Option::is_none")]
    download_url: Option<Cow<'a, str>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    external: Option<u8>,

    #[serde(rename = "productId", skip_serializing_if = "Option::is_none")]
    product_id: Option<Cow<'a, str>>,

    #[serde(rename = "productName", skip_serializing_if = "Option::is_none")]
    product_name: Option<Cow<'a, str>>,

    #[serde(rename = "customerMessage", skip_serializing_if = "Option::is_none")]
    customer_message: Option<&'a str>,
}
