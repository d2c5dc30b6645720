use lopdf::{Object, ObjectId, dictionary};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::types::{DocumentId, LoadError, PageCharacteristics};

/// Failure to re-encode one page as a standalone document.
#[derive(Debug, thiserror::Error)]
pub(crate) enum IsolationError {
    #[error("document has no page at local index {0}")]
    MissingPage(usize),
    #[error(transparent)]
    Pdf(#[from] lopdf::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Page attributes a child may inherit from its `Pages` ancestors.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against `Parent` cycles in malformed page trees.
const MAX_TREE_DEPTH: usize = 64;

/// One loaded source PDF. Immutable once loaded.
pub struct Document {
    id: DocumentId,
    path: PathBuf,
    name: String,
    byte_size: u64,
    sha256: String,
    pdf: lopdf::Document,
    page_ids: Vec<ObjectId>,
}

impl Document {
    /// Read and parse a PDF from disk.
    pub fn load(id: DocumentId, path: &Path) -> Result<Self, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(id, path, &bytes)
    }

    /// Parse a PDF already held in memory. `path` is used for naming and diagnostics only.
    pub fn from_bytes(id: DocumentId, path: &Path, bytes: &[u8]) -> Result<Self, LoadError> {
        let pdf = lopdf::Document::load_mem(bytes).map_err(|error| LoadError::InvalidContainer {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
        if pdf.is_encrypted() {
            return Err(LoadError::Encrypted {
                path: path.to_path_buf(),
            });
        }

        // `get_pages` is keyed by 1-based page number, so values come out in page order.
        let page_ids: Vec<ObjectId> = pdf.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(LoadError::NoPages {
                path: path.to_path_buf(),
            });
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            id,
            path: path.to_path_buf(),
            name,
            byte_size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            pdf,
            page_ids,
        })
    }

    /// Position of this document in load order.
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Path the document was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for classification and logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the source file in bytes.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Hex-encoded SHA-256 of the source bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Length of the decoded content stream(s) for a page, or 0 if it cannot be decoded.
    pub fn content_size(&self, local_index: usize) -> usize {
        self.page_ids
            .get(local_index)
            .and_then(|page_id| self.pdf.get_page_content(*page_id).ok())
            .map(|content| content.len())
            .unwrap_or(0)
    }

    /// Encode one page as a standalone single-page PDF.
    ///
    /// Only objects reachable from that page are copied into a fresh document, so the cost
    /// follows the page's size rather than the whole file's. Inherited attributes (resources,
    /// boxes, rotation) are materialised onto the page itself. References to other pages or
    /// to the page tree are left dangling, which readers treat as null.
    pub(crate) fn isolate_page(&self, local_index: usize) -> Result<Vec<u8>, IsolationError> {
        let page_id = *self
            .page_ids
            .get(local_index)
            .ok_or(IsolationError::MissingPage(local_index))?;

        let mut page = self.pdf.get_dictionary(page_id)?.clone();
        for (key, value) in inherited_attributes(&self.pdf, page_id) {
            if !page.has(&key) {
                page.set(key, value);
            }
        }
        page.remove(b"Parent");

        let mut single = lopdf::Document::with_version(self.pdf.version.clone());
        single.max_id = self.pdf.max_id;
        for id in reachable_objects(&self.pdf, page_id, &page) {
            if let Ok(object) = self.pdf.get_object(id) {
                single.objects.insert(id, object.clone());
            }
        }

        let pages_id = single.new_object_id();
        page.set("Parent", Object::Reference(pages_id));
        single.objects.insert(page_id, Object::Dictionary(page));
        single.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = single.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        single.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        single.save_to(&mut buffer)?;
        Ok(buffer)
    }

    /// Structural facts about one page, for diagnostics.
    pub fn page_characteristics(&self, local_index: usize) -> Option<PageCharacteristics> {
        let page_id = *self.page_ids.get(local_index)?;
        let page = self.pdf.get_dictionary(page_id).ok()?;
        let inherited = inherited_attributes(&self.pdf, page_id);
        let attribute = |key: &[u8]| -> Option<Object> {
            page.get(key).ok().cloned().or_else(|| {
                inherited
                    .iter()
                    .find(|(name, _)| name.as_slice() == key)
                    .map(|(_, value)| value.clone())
            })
        };

        let resources_object = attribute(b"Resources");
        let resources = resources_object
            .as_ref()
            .and_then(|object| self.resolve_dictionary(object));
        let fonts = self
            .resource_category(resources, b"Font")
            .map(|fonts| fonts.iter().map(|(name, font)| self.font_name(name, font)).collect())
            .unwrap_or_default();
        let image_count = self
            .resource_category(resources, b"XObject")
            .map(|xobjects| {
                xobjects
                    .iter()
                    .filter(|(_, xobject)| self.is_image(xobject))
                    .count()
            })
            .unwrap_or(0);

        let content_streams = match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.len(),
            Ok(_) => 1,
            Err(_) => 0,
        };
        let annotations = page
            .get(b"Annots")
            .ok()
            .and_then(|object| self.resolve(object).as_array().ok())
            .map_or(0, Vec::len);
        let media_box = attribute(b"MediaBox").and_then(|object| {
            let values: Vec<f64> = self
                .resolve(&object)
                .as_array()
                .ok()?
                .iter()
                .filter_map(number)
                .collect();
            <[f64; 4]>::try_from(values).ok()
        });
        let rotation = attribute(b"Rotate")
            .and_then(|object| self.resolve(&object).as_i64().ok())
            .unwrap_or(0);

        Some(PageCharacteristics {
            content_bytes: self.content_size(local_index),
            content_streams,
            fonts,
            image_count,
            annotations,
            media_box,
            rotation,
        })
    }

    fn resource_category<'a>(
        &'a self,
        resources: Option<&'a lopdf::Dictionary>,
        name: &[u8],
    ) -> Option<&'a lopdf::Dictionary> {
        resources
            .and_then(|resources| resources.get(name).ok())
            .and_then(|object| self.resolve_dictionary(object))
    }

    fn font_name(&self, resource_name: &[u8], font: &Object) -> String {
        let base = self
            .resolve_dictionary(font)
            .and_then(|font| font.get(b"BaseFont").ok())
            .and_then(|base| base.as_name().ok());
        String::from_utf8_lossy(base.unwrap_or(resource_name)).into_owned()
    }

    fn is_image(&self, xobject: &Object) -> bool {
        let dict = match self.resolve(xobject) {
            Object::Stream(stream) => &stream.dict,
            Object::Dictionary(dict) => dict,
            _ => return false,
        };
        dict.get(b"Subtype")
            .ok()
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|subtype| subtype == b"Image")
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.pdf.get_object(*id).unwrap_or(object),
            _ => object,
        }
    }

    fn resolve_dictionary<'a>(&'a self, object: &'a Object) -> Option<&'a lopdf::Dictionary> {
        self.resolve(object).as_dict().ok()
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

/// Ids of every indirect object `page` depends on, without following the page tree.
///
/// Traversal stops at `Parent` links and at other `Page`/`Pages` nodes, so link annotations
/// or structure references cannot drag the rest of the document along.
fn reachable_objects(
    pdf: &lopdf::Document,
    page_id: ObjectId,
    page: &lopdf::Dictionary,
) -> Vec<ObjectId> {
    let mut visited = HashSet::from([page_id]);
    let mut pending = Vec::new();
    push_references(&Object::Dictionary(page.clone()), &mut pending);

    let mut found = Vec::new();
    while let Some(id) = pending.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Ok(object) = pdf.get_object(id) else {
            continue;
        };
        if is_page_tree_node(object) {
            continue;
        }
        push_references(object, &mut pending);
        found.push(id);
    }
    found
}

fn push_references(object: &Object, pending: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => pending.push(*id),
        Object::Array(items) => {
            for item in items {
                push_references(item, pending);
            }
        }
        Object::Dictionary(dict) => push_dictionary_references(dict, pending),
        Object::Stream(stream) => push_dictionary_references(&stream.dict, pending),
        _ => {}
    }
}

fn push_dictionary_references(dict: &lopdf::Dictionary, pending: &mut Vec<ObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            push_references(value, pending);
        }
    }
}

fn is_page_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|kind| kind.as_name().ok())
        .is_some_and(|kind| kind == b"Page" || kind == b"Pages")
}

/// Collect inheritable attributes from the nearest ancestor that defines each one.
fn inherited_attributes(pdf: &lopdf::Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut current = pdf
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Parent").ok())
        .and_then(|parent| parent.as_reference().ok());

    for _ in 0..MAX_TREE_DEPTH {
        let Some(node_id) = current else {
            break;
        };
        let Ok(node) = pdf.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if found.iter().any(|(existing, _)| existing.as_slice() == key) {
                continue;
            }
            if let Ok(value) = node.get(key) {
                found.push((key.to_vec(), value.clone()));
            }
        }
        current = node
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok());
    }

    found
}
