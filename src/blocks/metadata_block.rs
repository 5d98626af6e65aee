use crate::blocks::common::BlockHeader;

/// Name of the tool recorded in file history entries.
pub const TOOL_ID: &str = env!("CARGO_PKG_NAME");
/// Version of the tool recorded in file history entries.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Vendor recorded in file history entries.
pub const TOOL_VENDOR: &str = "mdf4-rs contributors";

/// ##MD block holding an XML comment. Written unpadded; the output writer
/// aligns the next block.
#[derive(Debug, Clone)]
pub struct MetadataBlock {
    pub header: BlockHeader,
    pub xml: String,
}

impl MetadataBlock {
    pub fn new(xml: impl Into<String>) -> Self {
        let mut xml = xml.into();
        if !xml.ends_with('\0') {
            xml.push('\0');
        }
        Self {
            header: BlockHeader::new("##MD", 24 + xml.len() as u64, 0),
            xml,
        }
    }

    /// The `<FHcomment>` describing a change made by this tool.
    pub fn file_history_comment() -> Self {
        Self::new(format!(
            "<FHcomment><TX>Change</TX><tool_id>{}</tool_id><tool_vendor>{}</tool_vendor><tool_version>{}</tool_version></FHcomment>",
            TOOL_ID, TOOL_VENDOR, TOOL_VERSION
        ))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.extend_from_slice(self.xml.as_bytes());
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_comment_names_the_tool() {
        let md = MetadataBlock::file_history_comment();
        let bytes = md.to_bytes();
        assert_eq!(bytes.len() as u64, md.header.length);
        assert_eq!(*bytes.last().unwrap(), 0);
        let text = String::from_utf8_lossy(&bytes[24..]);
        assert!(text.starts_with("<FHcomment><TX>Change</TX>"));
        assert!(text.contains("<tool_id>mdf-sorter</tool_id>"));
    }
}
