//! Minimal FITS primary-header reader.
//!
//! Only the header is read: 2880-byte blocks of 80-character cards, up to the
//! `END` card. This is enough to size an image (`NAXIS1`/`NAXIS2`) without
//! pulling in the data unit.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use tracing::debug;

const CARD_SIZE: usize = 80;
const HEADER_BLOCK_SIZE: usize = 2880;
const CARDS_PER_BLOCK: usize = HEADER_BLOCK_SIZE / CARD_SIZE;

/// One 80-character header card.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCard {
    pub keyword: String,
    /// Raw value text, quotes included for strings.
    pub value: Option<String>,
    pub comment: Option<String>,
}

impl HeaderCard {
    pub fn parse(raw: &[u8]) -> anyhow::Result<Self> {
        if raw.len() != CARD_SIZE {
            bail!("header card must be {} bytes, got {}", CARD_SIZE, raw.len());
        }
        if !raw.is_ascii() {
            bail!("header card contains non-ASCII bytes");
        }
        let text = std::str::from_utf8(raw).context("invalid header card text")?;
        let keyword = text[..8].trim().to_string();

        if &text[8..10] != "= " {
            let comment = text[8..].trim();
            return Ok(Self {
                keyword,
                value: None,
                comment: (!comment.is_empty()).then(|| comment.to_string()),
            });
        }

        let (value, comment) = split_value_comment(&text[10..]);
        Ok(Self {
            keyword,
            value: (!value.is_empty()).then(|| value.to_string()),
            comment: comment.map(str::to_string),
        })
    }
}

/// Split the value field at the first `/` that is not inside a quoted string.
fn split_value_comment(field: &str) -> (&str, Option<&str>) {
    let mut in_string = false;
    for (i, ch) in field.char_indices() {
        match ch {
            '\'' => in_string = !in_string,
            '/' if !in_string => {
                let comment = field[i + 1..].trim();
                return (field[..i].trim(), (!comment.is_empty()).then_some(comment));
            }
            _ => {}
        }
    }
    (field.trim(), None)
}

#[derive(Debug, Clone, Default)]
pub struct FitsHeader {
    cards: Vec<HeaderCard>,
    index: HashMap<String, usize>,
}

impl FitsHeader {
    /// Parse header blocks from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut header = Self::default();
        for block in bytes.chunks(HEADER_BLOCK_SIZE) {
            if block.len() != HEADER_BLOCK_SIZE {
                bail!("truncated FITS header block ({} bytes)", block.len());
            }
            if header.push_block(block)? {
                return Ok(header);
            }
        }
        bail!("FITS header has no END card")
    }

    /// Add the cards of one block; returns `true` once `END` is seen.
    fn push_block(&mut self, block: &[u8]) -> anyhow::Result<bool> {
        for raw in block.chunks(CARD_SIZE).take(CARDS_PER_BLOCK) {
            let card = HeaderCard::parse(raw)?;
            if card.keyword == "END" {
                return Ok(true);
            }
            if !card.keyword.is_empty() {
                self.index.entry(card.keyword.clone()).or_insert(self.cards.len());
            }
            self.cards.push(card);
        }
        Ok(false)
    }

    pub fn cards(&self) -> &[HeaderCard] {
        &self.cards
    }

    /// Raw value text of the first card with `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.index
            .get(keyword)
            .and_then(|&i| self.cards[i].value.as_deref())
    }

    pub fn get_int(&self, keyword: &str) -> Option<i64> {
        self.get(keyword)?.parse().ok()
    }

    /// Floating-point value; accepts Fortran-style `D` exponents.
    pub fn get_float(&self, keyword: &str) -> Option<f64> {
        self.get(keyword)?.replace(['D', 'd'], "E").parse().ok()
    }

    pub fn get_logical(&self, keyword: &str) -> Option<bool> {
        match self.get(keyword)? {
            "T" => Some(true),
            "F" => Some(false),
            _ => None,
        }
    }

    /// String value with the surrounding quotes removed and `''` unescaped.
    pub fn get_str(&self, keyword: &str) -> Option<String> {
        let raw = self.get(keyword)?;
        let inner = raw.strip_prefix('\'')?.strip_suffix('\'')?;
        Some(inner.replace("''", "'").trim_end().to_string())
    }

    /// Image width and height (`NAXIS1`, `NAXIS2`) in pixels.
    pub fn image_dimensions(&self) -> anyhow::Result<(usize, usize)> {
        let naxis = self.get_int("NAXIS").context("header has no NAXIS keyword")?;
        if naxis < 2 {
            bail!("expected a 2-D image, header has NAXIS = {}", naxis);
        }
        let width = self.get_int("NAXIS1").context("header has no NAXIS1 keyword")?;
        let height = self.get_int("NAXIS2").context("header has no NAXIS2 keyword")?;
        if width < 0 || height < 0 {
            bail!("negative image axis length ({} x {})", width, height);
        }
        Ok((width as usize, height as usize))
    }
}

/// Read the primary header of a FITS file.
pub fn read_primary_header<P: AsRef<Path>>(path: P) -> anyhow::Result<FitsHeader> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;
    let mut header = FitsHeader::default();
    let mut block = vec![0u8; HEADER_BLOCK_SIZE];
    loop {
        file.read_exact(&mut block)
            .with_context(|| format!("FITS header of {} ended before END", path.display()))?;
        if header.push_block(&block)? {
            break;
        }
    }
    debug!("Read {} header cards from {}", header.cards.len(), path.display());
    Ok(header)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Pad `cards` to 80 characters each and the header to whole blocks.
    pub(crate) fn header_bytes(cards: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for card in cards.iter().chain(std::iter::once(&"END")) {
            bytes.extend(format!("{card:<80}").bytes());
        }
        let padded = bytes.len().div_ceil(HEADER_BLOCK_SIZE) * HEADER_BLOCK_SIZE;
        bytes.resize(padded, b' ');
        bytes
    }

    pub(crate) fn image_header(width: usize, height: usize) -> Vec<u8> {
        let naxis1 = format!("NAXIS1  = {width:>20} / length of data axis 1");
        let naxis2 = format!("NAXIS2  = {height:>20} / length of data axis 2");
        header_bytes(&[
            "SIMPLE  =                    T / conforms to FITS standard",
            "BITPIX  =                  -32 / array data type",
            "NAXIS   =                    2 / number of array dimensions",
            naxis1.as_str(),
            naxis2.as_str(),
            "OBJECT  = 'M 31 / core'        / target with a slash",
            "EXPTIME =             1.20D+02",
            "COMMENT just a remark",
        ])
    }

    #[test]
    fn parses_keywords_and_values() {
        let header = FitsHeader::parse(&image_header(640, 480)).unwrap();
        assert_eq!(header.get_logical("SIMPLE"), Some(true));
        assert_eq!(header.get_int("BITPIX"), Some(-32));
        assert_eq!(header.get_str("OBJECT").as_deref(), Some("M 31 / core"));
        assert_eq!(header.get_float("EXPTIME"), Some(120.0));
        assert_eq!(header.image_dimensions().unwrap(), (640, 480));
        assert!(header.get("MISSING").is_none());
    }

    #[test]
    fn comment_cards_have_no_value() {
        let card = HeaderCard::parse(format!("{:<80}", "COMMENT just a remark").as_bytes()).unwrap();
        assert_eq!(card.keyword, "COMMENT");
        assert_eq!(card.value, None);
        assert_eq!(card.comment.as_deref(), Some("just a remark"));
    }

    #[test]
    fn header_spanning_two_blocks() {
        let filler: Vec<String> = (0..40).map(|i| format!("KEY{i:<5}= {i:>20}")).collect();
        let mut cards: Vec<&str> = vec!["SIMPLE  =                    T", "NAXIS   =                    2"];
        cards.extend(filler.iter().map(String::as_str));
        cards.push("NAXIS1  =                   10");
        cards.push("NAXIS2  =                   20");
        let bytes = header_bytes(&cards);
        assert_eq!(bytes.len(), 2 * HEADER_BLOCK_SIZE);
        let header = FitsHeader::parse(&bytes).unwrap();
        assert_eq!(header.get_int("KEY39"), Some(39));
        assert_eq!(header.image_dimensions().unwrap(), (10, 20));
    }

    #[test]
    fn missing_end_is_an_error() {
        let mut bytes = format!("{:<80}", "SIMPLE  =                    T").into_bytes();
        bytes.resize(HEADER_BLOCK_SIZE, b' ');
        assert!(FitsHeader::parse(&bytes).is_err());
    }

    #[test]
    fn one_dimensional_image_has_no_dimensions() {
        let bytes = header_bytes(&["SIMPLE  =                    T", "NAXIS   =                    1", "NAXIS1  =                    5"]);
        assert!(FitsHeader::parse(&bytes).unwrap().image_dimensions().is_err());
    }

    #[test]
    fn reads_header_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &image_header(32, 16)).unwrap();
        let header = read_primary_header(file.path()).unwrap();
        assert_eq!(header.image_dimensions().unwrap(), (32, 16));
    }
}
