//! PDF signature stamping.
//!
//! A signature is stamped onto every page of the agreement. The stamp is a
//! block anchored at a [`GridPosition`]: the borrower's signature image
//! (80x90 pt, drawn 10 pt above the anchor) followed by four audit lines
//! (loan ID, IP address, date, time) running downward from the anchor.
//!
//! The overlay is built once and shared by every page. Each page keeps its
//! own content intact: the original streams are wrapped in `q`/`Q` so any
//! graphics state they leave behind cannot shift the stamp, and the page
//! resources are resolved through the page tree and rewritten inline so
//! pages that inherited fonts from their parent keep them.
//!
//! Resource names carry the slot number, so stamping the same document
//! again for the next borrower never clobbers an earlier signature.

use std::io::Write;

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::imageops::FilterType;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::error::StampError;
use crate::layout::GridPosition;

/// Rendered width of the signature image, in points and pixels.
pub const SIGNATURE_WIDTH: u32 = 80;
/// Rendered height of the signature image, in points and pixels.
pub const SIGNATURE_HEIGHT: u32 = 90;

const FONT_SIZE: i64 = 10;
const LINE_SPACING: i64 = 10;
/// Bound on `Parent` hops when resolving inherited resources.
const MAX_TREE_DEPTH: usize = 64;

/// Summary of a parsed PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfSummary {
    pub page_count: u32,
}

/// A decoded signature, resized and split into colour and alpha planes.
#[derive(Clone)]
pub struct SignatureImage {
    rgb: Vec<u8>,
    /// `None` when the source image is fully opaque.
    alpha: Option<Vec<u8>>,
}

impl std::fmt::Debug for SignatureImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureImage")
            .field("rgb_bytes", &self.rgb.len())
            .field("has_alpha", &self.alpha.is_some())
            .finish()
    }
}

impl SignatureImage {
    /// Decode PNG or JPEG bytes and resize to the stamp dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`StampError::ImageDecode`] if the bytes are not a supported
    /// image.
    pub fn decode(bytes: &[u8]) -> Result<Self, StampError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| StampError::ImageDecode {
            reason: e.to_string(),
        })?;
        let rgba = decoded
            .resize_exact(SIGNATURE_WIDTH, SIGNATURE_HEIGHT, FilterType::CatmullRom)
            .to_rgba8();

        let pixels = rgba.pixels().len();
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        let opaque = alpha.iter().all(|a| *a == u8::MAX);

        Ok(Self {
            rgb,
            alpha: (!opaque).then_some(alpha),
        })
    }

    /// Whether the image carries transparency.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }
}

/// Identity and audit details printed under the signature.
#[derive(Debug, Clone)]
pub struct SignatureMark {
    /// Grid slot; used to keep resource names unique per signature.
    pub slot: u32,
    pub position: GridPosition,
    pub loan_id: String,
    pub ip_address: String,
    pub signed_at: DateTime<Utc>,
}

impl SignatureMark {
    /// The four audit lines, top to bottom.
    #[must_use]
    pub fn lines(&self) -> [String; 4] {
        [
            printable(&self.loan_id),
            printable(&self.ip_address),
            self.signed_at.format("%Y-%m-%d").to_string(),
            self.signed_at.format("%H:%M:%S").to_string(),
        ]
    }
}

/// Parse `bytes` and report its page count.
///
/// # Errors
///
/// - [`StampError::NotPdf`] if the header is missing.
/// - [`StampError::PdfParse`] if parsing fails or the file is encrypted.
/// - [`StampError::EmptyDocument`] if there are no pages.
pub fn inspect(bytes: &[u8]) -> Result<PdfSummary, StampError> {
    let doc = load(bytes)?;
    let page_count =
        u32::try_from(doc.get_pages().len()).map_err(|_| StampError::PdfParse {
            reason: "page count overflows u32".to_owned(),
        })?;
    Ok(PdfSummary { page_count })
}

/// Stamp `image` and the audit lines of `mark` onto every page of `pdf`.
///
/// Returns the complete rewritten document.
///
/// # Errors
///
/// Returns [`StampError`] if the input cannot be parsed, a page is
/// malformed, or the output cannot be serialized.
pub fn stamp_signature(
    pdf: &[u8],
    image: &SignatureImage,
    mark: &SignatureMark,
) -> Result<Vec<u8>, StampError> {
    let mut doc = load(pdf)?;
    let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();

    let image_name = format!("LsSig{}", mark.slot);
    let font_name = format!("LsFont{}", mark.slot);

    let image_id = add_image(&mut doc, image)?;
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut overlay = b"Q\n".to_vec();
    overlay.extend(overlay_content(mark, &image_name, &font_name)?);
    let overlay_id = doc.add_object(deflate(Dictionary::new(), &overlay)?);

    for (number, page_id) in pages {
        let mut resources = resolve_resources(&doc, page_id, number)?;
        register(&doc, &mut resources, b"XObject", &image_name, image_id, number)?;
        register(&doc, &mut resources, b"Font", &font_name, font_id, number)?;

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(page_contents(&doc, page_id, number)?);
        contents.push(Object::Reference(overlay_id));

        let page = doc
            .get_dictionary_mut(page_id)
            .map_err(|e| malformed(number, &e.to_string()))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));
    }

    let mut out = Vec::with_capacity(pdf.len() + 32 * 1024);
    doc.save_to(&mut out).map_err(|e| StampError::PdfWrite {
        reason: e.to_string(),
    })?;
    Ok(out)
}

fn load(bytes: &[u8]) -> Result<Document, StampError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(StampError::NotPdf);
    }
    let doc = Document::load_mem(bytes).map_err(|e| StampError::PdfParse {
        reason: e.to_string(),
    })?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(StampError::PdfParse {
            reason: "encrypted PDFs are not supported".to_owned(),
        });
    }
    if doc.get_pages().is_empty() {
        return Err(StampError::EmptyDocument);
    }
    Ok(doc)
}

fn add_image(doc: &mut Document, image: &SignatureImage) -> Result<ObjectId, StampError> {
    let width = i64::from(SIGNATURE_WIDTH);
    let height = i64::from(SIGNATURE_HEIGHT);

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };

    if let Some(alpha) = &image.alpha {
        let mask = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        };
        let mask_id = doc.add_object(deflate(mask, alpha)?);
        dict.set("SMask", Object::Reference(mask_id));
    }

    Ok(doc.add_object(deflate(dict, &image.rgb)?))
}

fn overlay_content(
    mark: &SignatureMark,
    image_name: &str,
    font_name: &str,
) -> Result<Vec<u8>, StampError> {
    let x = i64::from(mark.position.x);
    let y = i64::from(mark.position.y);
    let text_y = y + 20;

    let mut operations = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Integer(i64::from(SIGNATURE_WIDTH)),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(i64::from(SIGNATURE_HEIGHT)),
                Object::Integer(x),
                Object::Integer(y + 10),
            ],
        ),
        Operation::new("Do", vec![Object::Name(image_name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(font_name.as_bytes().to_vec()),
                Object::Integer(FONT_SIZE),
            ],
        ),
        Operation::new(
            "Td",
            vec![Object::Integer(x), Object::Integer(text_y - LINE_SPACING)],
        ),
    ];

    for (i, line) in mark.lines().into_iter().enumerate() {
        if i > 0 {
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(0), Object::Integer(-LINE_SPACING)],
            ));
        }
        operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
    }
    operations.push(Operation::new("ET", vec![]));

    Content { operations }
        .encode()
        .map_err(|e| StampError::PdfWrite {
            reason: e.to_string(),
        })
}

/// The page's content stream references, flattened. An indirect array is
/// expanded so the result can be nested in a new `Contents` array.
fn page_contents(doc: &Document, page_id: ObjectId, page: u32) -> Result<Vec<Object>, StampError> {
    let dict = doc
        .get_dictionary(page_id)
        .map_err(|e| malformed(page, &e.to_string()))?;
    match dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(_) => Err(malformed(page, "Contents is neither a reference nor an array")),
        Err(_) => Ok(Vec::new()),
    }
}

/// Effective resources of a page, following `Parent` links for inheritance.
fn resolve_resources(
    doc: &Document,
    page_id: ObjectId,
    page: u32,
) -> Result<Dictionary, StampError> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc
            .get_dictionary(node_id)
            .map_err(|e| malformed(page, &e.to_string()))?;
        if let Ok(resources) = node.get(b"Resources") {
            return deref_dict(doc, resources, page).cloned();
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => return Ok(Dictionary::new()),
        }
    }
    Err(malformed(page, "page tree exceeds maximum depth"))
}

/// Add `name -> id` under `category` (e.g. `/Font`), copying any shared
/// sub-dictionary so other pages are not affected.
fn register(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
    page: u32,
) -> Result<(), StampError> {
    let mut entries = match resources.get(category) {
        Ok(existing) => deref_dict(doc, existing, page)?.clone(),
        Err(_) => Dictionary::new(),
    };
    entries.set(name.as_bytes().to_vec(), Object::Reference(id));
    resources.set(category.to_vec(), Object::Dictionary(entries));
    Ok(())
}

fn deref_dict<'a>(
    doc: &'a Document,
    object: &'a Object,
    page: u32,
) -> Result<&'a Dictionary, StampError> {
    match object {
        Object::Dictionary(dict) => Ok(dict),
        Object::Reference(id) => doc
            .get_dictionary(*id)
            .map_err(|e| malformed(page, &e.to_string())),
        _ => Err(malformed(page, "expected a dictionary in page resources")),
    }
}

fn deflate(mut dict: Dictionary, raw: &[u8]) -> Result<Stream, StampError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| StampError::Compression {
            reason: e.to_string(),
        })?;
    let data = encoder.finish().map_err(|e| StampError::Compression {
        reason: e.to_string(),
    })?;
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    Ok(Stream::new(dict, data))
}

/// Standard Helvetica is not embedded, so restrict text to printable ASCII.
fn printable(text: &str) -> String {
    text.chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect()
}

fn malformed(page: u32, reason: &str) -> StampError {
    StampError::MalformedPage {
        page,
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::io::{Cursor, Read};

    use chrono::TimeZone;
    use flate2::read::ZlibDecoder;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    use super::*;

    /// A letter-sized PDF whose pages inherit a font from the page tree root.
    pub(crate) fn sample_pdf(page_count: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for i in 0..page_count {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Clause {i}"))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => i64::try_from(page_count).unwrap(),
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// A PNG with a transparent background and a dark stroke.
    pub(crate) fn sample_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(240, 120, |x, y| {
            if y.abs_diff(x / 2) < 3 {
                Rgba([10, 10, 60, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn mark(slot: u32, position: GridPosition) -> SignatureMark {
        SignatureMark {
            slot,
            position,
            loan_id: "LN-1001".to_owned(),
            ip_address: "203.0.113.7".to_owned(),
            signed_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap(),
        }
    }

    fn page_dicts(bytes: &[u8]) -> (Document, Vec<Dictionary>) {
        let doc = Document::load_mem(bytes).unwrap();
        let dicts = doc
            .get_pages()
            .values()
            .map(|id| doc.get_dictionary(*id).unwrap().clone())
            .collect();
        (doc, dicts)
    }

    fn inflate(doc: &Document, id: ObjectId) -> String {
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        let mut out = String::new();
        ZlibDecoder::new(stream.content.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    // ── inspect ──────────────────────────────────────────────────────

    #[test]
    fn inspect_counts_pages() {
        assert_eq!(inspect(&sample_pdf(3)).unwrap().page_count, 3);
    }

    #[test]
    fn inspect_rejects_non_pdf() {
        assert!(matches!(inspect(b"PK\x03\x04zip").unwrap_err(), StampError::NotPdf));
    }

    #[test]
    fn inspect_rejects_truncated_pdf() {
        let err = inspect(b"%PDF-1.5\n1 0 obj").unwrap_err();
        assert!(matches!(
            err,
            StampError::PdfParse { .. } | StampError::EmptyDocument
        ));
    }

    // ── SignatureImage ───────────────────────────────────────────────

    #[test]
    fn transparent_png_keeps_alpha_plane() {
        let image = SignatureImage::decode(&sample_png()).unwrap();
        assert!(image.has_alpha());
        assert_eq!(image.rgb.len(), (SIGNATURE_WIDTH * SIGNATURE_HEIGHT * 3) as usize);
    }

    #[test]
    fn garbage_image_is_rejected() {
        let err = SignatureImage::decode(b"not an image").unwrap_err();
        assert!(matches!(err, StampError::ImageDecode { .. }));
    }

    // ── SignatureMark ────────────────────────────────────────────────

    #[test]
    fn mark_lines_format_date_and_time() {
        let lines = mark(0, GridPosition { x: 25, y: 25 }).lines();
        assert_eq!(lines, ["LN-1001", "203.0.113.7", "2026-03-14", "09:26:53"]);
    }

    #[test]
    fn non_ascii_text_is_replaced() {
        assert_eq!(printable("LN-é1(x)"), "LN-?1(x)");
    }

    // ── stamp_signature ──────────────────────────────────────────────

    #[test]
    fn stamps_every_page() {
        let image = SignatureImage::decode(&sample_png()).unwrap();
        let stamped =
            stamp_signature(&sample_pdf(2), &image, &mark(0, GridPosition { x: 25, y: 25 }))
                .unwrap();

        let (doc, pages) = page_dicts(&stamped);
        assert_eq!(pages.len(), 2);
        for page in &pages {
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            assert!(xobjects.has(b"LsSig0"));
            let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
            assert!(fonts.has(b"LsFont0"));
            // Inherited font survives the inline copy.
            assert!(fonts.has(b"F1"));

            let contents = page.get(b"Contents").unwrap().as_array().unwrap();
            assert_eq!(contents.len(), 3);
            let overlay_id = contents[2].as_reference().unwrap();
            let overlay = inflate(&doc, overlay_id);
            assert!(overlay.starts_with("Q\n"));
            assert!(overlay.contains("80 0 0 90 25 35 cm"));
            assert!(overlay.contains("(LN-1001) Tj"));
            assert!(overlay.contains("(2026-03-14) Tj"));
        }
    }

    #[test]
    fn second_signature_keeps_the_first() {
        let image = SignatureImage::decode(&sample_png()).unwrap();
        let once =
            stamp_signature(&sample_pdf(1), &image, &mark(0, GridPosition { x: 25, y: 25 }))
                .unwrap();
        let twice =
            stamp_signature(&once, &image, &mark(1, GridPosition { x: 145, y: 25 })).unwrap();

        let (doc, pages) = page_dicts(&twice);
        let resources = pages[0].get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.has(b"LsSig0"));
        assert!(xobjects.has(b"LsSig1"));

        let contents = pages[0].get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 5);
        let latest = inflate(&doc, contents[4].as_reference().unwrap());
        assert!(latest.contains("80 0 0 90 145 35 cm"));
    }

    #[test]
    fn stamping_non_pdf_fails() {
        let image = SignatureImage::decode(&sample_png()).unwrap();
        let err = stamp_signature(b"hello", &image, &mark(0, GridPosition { x: 25, y: 25 }))
            .unwrap_err();
        assert!(matches!(err, StampError::NotPdf));
    }
}
