// crates/workload-trust-clients/src/c14n.rs
// ============================================================================
// Module: Exclusive XML Canonicalization
// Description: Exclusive c14n (without comments) of signed assertion parts.
// Purpose: Produce the exact bytes XML-DSig digests and signatures cover.
// Dependencies: xml-rs
// ============================================================================

//! ## Overview
//! Renders one element subtree of a document in exclusive canonical form
//! (`http://www.w3.org/2001/10/xml-exc-c14n#`). Only namespaces visibly used
//! by an output element, or named in the inclusive prefix list, are emitted,
//! and only when no output ancestor already emitted the same binding.
//! Invariants:
//! - Comments are dropped and empty elements are written as start/end pairs.
//! - Namespace declarations precede attributes; both are sorted.
//! - Malformed input or a missing target element is an error, never a guess.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::namespace::Namespace;
use xml::reader::ParserConfig;
use xml::reader::XmlEvent;

use crate::xmldsig::DSIG_NS;
use crate::xmldsig::SignatureError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix bound to the XML namespace; never declared in output.
const XML_PREFIX: &str = "xml";
/// Inclusive prefix list token for the default namespace.
const DEFAULT_TOKEN: &str = "#default";

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Element subtree to canonicalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum C14nTarget {
    /// The document element.
    Document {
        /// Drop the `ds:Signature` child of the document element.
        enveloped: bool,
    },
    /// `SignedInfo` of the `ds:Signature` child of the document element.
    SignedInfo,
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Canonicalizes the target subtree of `xml`.
///
/// `inclusive` is the `InclusiveNamespaces` prefix list; `#default` names the
/// default namespace.
///
/// # Errors
///
/// Returns [`SignatureError::Malformed`] when the document does not parse or
/// the target element is absent.
pub(crate) fn canonicalize(
    xml: &[u8],
    target: C14nTarget,
    inclusive: &[String],
) -> Result<Vec<u8>, SignatureError> {
    let reader = ParserConfig::new()
        .trim_whitespace(false)
        .whitespace_to_characters(true)
        .cdata_to_characters(true)
        .ignore_comments(true)
        .coalesce_characters(true)
        .create_reader(xml);

    let mut writer = C14nWriter::new(inclusive);
    let mut depth = 0usize;
    let mut in_signature = false;
    let mut captured: Option<usize> = None;
    let mut skipped: Option<usize> = None;

    for event in reader {
        match event.map_err(|err| SignatureError::Malformed(err.to_string()))? {
            XmlEvent::StartElement {
                name,
                attributes,
                namespace,
            } => {
                depth += 1;
                let is_signature = depth == 2 && is_dsig(&name, &namespace, "Signature");
                if is_signature {
                    in_signature = true;
                }
                if skipped.is_some() {
                    continue;
                }
                match captured {
                    Some(_) => {
                        if is_signature && target == (C14nTarget::Document { enveloped: true }) {
                            skipped = Some(depth);
                            continue;
                        }
                    }
                    None => {
                        let starts = match target {
                            C14nTarget::Document { .. } => depth == 1,
                            C14nTarget::SignedInfo => {
                                depth == 3
                                    && in_signature
                                    && is_dsig(&name, &namespace, "SignedInfo")
                            }
                        };
                        if !starts {
                            continue;
                        }
                        captured = Some(depth);
                    }
                }
                writer.start(&name, &attributes, &namespace);
            }
            XmlEvent::EndElement {
                name,
            } => {
                if depth == 2 {
                    in_signature = false;
                }
                if skipped == Some(depth) {
                    skipped = None;
                } else if skipped.is_none() && captured.is_some() {
                    writer.end(&name);
                    if captured == Some(depth) {
                        return Ok(writer.finish());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text) | XmlEvent::CData(text) => {
                if captured.is_some() && skipped.is_none() {
                    writer.text(&text);
                }
            }
            XmlEvent::ProcessingInstruction {
                name,
                data,
            } => {
                if captured.is_some() && skipped.is_none() {
                    writer.processing_instruction(&name, data.as_deref());
                }
            }
            _ => {}
        }
    }
    Err(SignatureError::Malformed("signed element not found".to_string()))
}

/// Returns true when `name` is the XML-DSig element `local`.
fn is_dsig(name: &OwnedName, namespace: &Namespace, local: &str) -> bool {
    name.local_name == local && namespace_uri(namespace, name.prefix.as_deref()) == DSIG_NS
}

/// Resolves a prefix against the in-scope namespaces; unbound resolves empty.
fn namespace_uri<'a>(namespace: &'a Namespace, prefix: Option<&str>) -> &'a str {
    namespace.get(prefix.unwrap_or("")).unwrap_or("")
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Canonical output buffer plus the namespace bindings each open element rendered.
struct C14nWriter<'a> {
    /// Canonical bytes written so far.
    out: Vec<u8>,
    /// Bindings visible to each open output element, innermost last.
    rendered: Vec<BTreeMap<String, String>>,
    /// Prefixes treated as visibly utilized on every element.
    inclusive: &'a [String],
}

impl<'a> C14nWriter<'a> {
    /// Creates an empty writer.
    const fn new(inclusive: &'a [String]) -> Self {
        Self {
            out: Vec::new(),
            rendered: Vec::new(),
            inclusive,
        }
    }

    /// Writes a start tag with its namespace declarations and attributes.
    fn start(&mut self, name: &OwnedName, attributes: &[OwnedAttribute], namespace: &Namespace) {
        let parent = self.rendered.last().cloned().unwrap_or_default();

        let mut utilized = BTreeSet::new();
        utilized.insert(name.prefix.clone().unwrap_or_default());
        for attribute in attributes {
            if let Some(prefix) = &attribute.name.prefix {
                utilized.insert(prefix.clone());
            }
        }
        for token in self.inclusive {
            let prefix = if token == DEFAULT_TOKEN { "" } else { token.as_str() };
            if namespace.get(prefix).is_some() {
                utilized.insert(prefix.to_string());
            }
        }

        let mut current = parent.clone();
        let mut declarations = Vec::new();
        for prefix in utilized {
            if prefix == XML_PREFIX {
                continue;
            }
            let uri = namespace.get(prefix.as_str()).unwrap_or("");
            let already = if prefix.is_empty() {
                parent.get(&prefix).map_or("", String::as_str) == uri
            } else {
                parent.get(&prefix).map(String::as_str) == Some(uri)
            };
            if already {
                continue;
            }
            current.insert(prefix.clone(), uri.to_string());
            declarations.push((prefix, uri.to_string()));
        }

        let mut sorted: Vec<(&str, &OwnedAttribute)> = attributes
            .iter()
            .map(|attribute| {
                let uri = attribute
                    .name
                    .prefix
                    .as_deref()
                    .map_or("", |prefix| namespace_uri(namespace, Some(prefix)));
                (uri, attribute)
            })
            .collect();
        sorted.sort_by(|(left_uri, left), (right_uri, right)| {
            left_uri
                .cmp(right_uri)
                .then_with(|| left.name.local_name.cmp(&right.name.local_name))
        });

        self.out.push(b'<');
        self.write_name(name);
        for (prefix, uri) in declarations {
            if prefix.is_empty() {
                self.out.extend_from_slice(b" xmlns=\"");
            } else {
                self.out.extend_from_slice(b" xmlns:");
                self.out.extend_from_slice(prefix.as_bytes());
                self.out.extend_from_slice(b"=\"");
            }
            escape_attribute(&uri, &mut self.out);
            self.out.push(b'"');
        }
        for (_, attribute) in sorted {
            self.out.push(b' ');
            self.write_name(&attribute.name);
            self.out.extend_from_slice(b"=\"");
            escape_attribute(&attribute.value, &mut self.out);
            self.out.push(b'"');
        }
        self.out.push(b'>');
        self.rendered.push(current);
    }

    /// Writes an end tag.
    fn end(&mut self, name: &OwnedName) {
        self.out.extend_from_slice(b"</");
        self.write_name(name);
        self.out.push(b'>');
        self.rendered.pop();
    }

    /// Writes character data.
    fn text(&mut self, text: &str) {
        escape_text(text, &mut self.out);
    }

    /// Writes a processing instruction.
    fn processing_instruction(&mut self, target: &str, data: Option<&str>) {
        self.out.extend_from_slice(b"<?");
        self.out.extend_from_slice(target.as_bytes());
        if let Some(data) = data.filter(|data| !data.is_empty()) {
            self.out.push(b' ');
            self.out.extend_from_slice(data.as_bytes());
        }
        self.out.extend_from_slice(b"?>");
    }

    /// Writes a qualified name.
    fn write_name(&mut self, name: &OwnedName) {
        if let Some(prefix) = &name.prefix {
            self.out.extend_from_slice(prefix.as_bytes());
            self.out.push(b':');
        }
        self.out.extend_from_slice(name.local_name.as_bytes());
    }

    /// Returns the canonical bytes.
    fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Escapes character data.
fn escape_text(text: &str, out: &mut Vec<u8>) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => push_char(ch, out),
        }
    }
}

/// Escapes an attribute value.
fn escape_attribute(value: &str, out: &mut Vec<u8>) {
    for ch in value.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\t' => out.extend_from_slice(b"&#x9;"),
            '\n' => out.extend_from_slice(b"&#xA;"),
            '\r' => out.extend_from_slice(b"&#xD;"),
            _ => push_char(ch, out),
        }
    }
}

/// Appends one character as UTF-8.
fn push_char(ch: char, out: &mut Vec<u8>) {
    let mut buffer = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
}

// ============================================================================
// SECTION: Tests
// ============================================================================
