#![forbid(unsafe_code)]

//! XSLT transform.
//!
//! No XSLT processor is bundled. The stylesheet is kept verbatim and handed
//! to an [`XsltEngine`] registered on the environment.

use crate::data::TransformData;
use crate::TransformEnv;
use domsig_core::Error;
use domsig_xml::document::element_children;
use roxmltree::Node;

/// An XSLT 1.0 processor.
pub trait XsltEngine {
    /// Apply `stylesheet` to the serialized `input` document.
    fn transform(&self, stylesheet: &str, input: &[u8]) -> Result<Vec<u8>, Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsltTransform {
    stylesheet: String,
}

impl XsltTransform {
    pub fn new(stylesheet: impl Into<String>) -> Self {
        Self {
            stylesheet: stylesheet.into(),
        }
    }

    /// Capture the stylesheet element under a `<Transform>` as written.
    pub fn from_transform(transform: Node<'_, '_>) -> Result<Self, Error> {
        let sheet = element_children(transform)
            .next()
            .ok_or_else(|| Error::MissingElement("XSLT stylesheet".into()))?;
        let text = transform.document().input_text();
        let source = text
            .get(sheet.range())
            .ok_or_else(|| Error::Marshal("stylesheet range out of bounds".into()))?;
        Ok(Self::new(source))
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    pub fn execute(&self, input: TransformData, env: &TransformEnv<'_>) -> Result<TransformData, Error> {
        let engine = env
            .xslt
            .ok_or_else(|| Error::Other("no XSLT engine configured".into()))?;
        let octets = input.into_octets()?;
        let output = engine.transform(&self.stylesheet, &octets)?;
        tracing::debug!(output_len = output.len(), "XSLT transform");
        Ok(TransformData::Octets(output))
    }
}
