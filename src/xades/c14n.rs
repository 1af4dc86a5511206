//! Canonical XML 1.1 views of a parsed invoice.

use libxml::parser::{Parser, ParserOptions};
use libxml::tree::{Document, c14n};
use libxml::xpath;

use super::{DS_NS, XADES_NS};
use crate::core::SigningError;
use crate::ubl::ns;

/// A parsed invoice with the namespace prefixes used by the signature
/// registered for XPath lookups.
pub(crate) struct ParsedDocument {
    doc: Document,
}

impl ParsedDocument {
    pub(crate) fn parse(xml: &str) -> Result<Self, SigningError> {
        let strict = ParserOptions {
            recover: false,
            ..ParserOptions::default()
        };
        let doc = Parser::default()
            .parse_string_with_options(xml, strict)
            .map_err(|e| SigningError::MalformedDocument(format!("XML parse error: {e:?}")))?;
        Ok(Self { doc })
    }

    /// Canonical form of the whole document with the extension block
    /// removed. The XML declaration is not part of it.
    pub(crate) fn canonical_without_extensions(&self) -> Result<String, SigningError> {
        let copy = self
            .doc
            .dup()
            .map_err(|_| malformed("cannot duplicate document"))?;
        let ctx = context(&copy)?;
        for mut node in nodes(&ctx, "/*/ext:UBLExtensions")? {
            node.unlink();
        }
        copy.canonicalize(options(), None)
            .map_err(|_| malformed("cannot canonicalize document"))
    }

    /// Canonical form of the first element matching `expr`, in the context
    /// of its ancestors' namespaces.
    pub(crate) fn canonical_element(&self, expr: &str) -> Result<Option<String>, SigningError> {
        let ctx = context(&self.doc)?;
        match nodes(&ctx, expr)?.into_iter().next() {
            Some(mut node) => node
                .canonicalize(options())
                .map(Some)
                .map_err(|_| malformed(format!("cannot canonicalize {expr}"))),
            None => Ok(None),
        }
    }

    /// Trimmed text content of the first element matching `expr`.
    pub(crate) fn text(&self, expr: &str) -> Result<Option<String>, SigningError> {
        let ctx = context(&self.doc)?;
        Ok(nodes(&ctx, expr)?
            .first()
            .map(|node| node.get_content().trim().to_string()))
    }
}

fn options() -> c14n::CanonicalizationOptions {
    c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_1,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    }
}

fn context(doc: &Document) -> Result<xpath::Context, SigningError> {
    let ctx = xpath::Context::new(doc).map_err(|_| malformed("XPath context error"))?;
    for (prefix, uri) in [("ext", ns::EXT), ("ds", DS_NS), ("xades", XADES_NS)] {
        ctx.register_namespace(prefix, uri)
            .map_err(|_| malformed(format!("cannot register prefix {prefix}")))?;
    }
    Ok(ctx)
}

fn nodes(ctx: &xpath::Context, expr: &str) -> Result<Vec<libxml::tree::Node>, SigningError> {
    Ok(ctx
        .evaluate(expr)
        .map_err(|_| malformed(format!("XPath error for {expr}")))?
        .get_nodes_as_vec())
}

fn malformed(message: impl Into<String>) -> SigningError {
    SigningError::MalformedDocument(message.into())
}
