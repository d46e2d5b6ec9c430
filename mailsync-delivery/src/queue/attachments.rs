//! Attachments in a form that survives job serialization

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::Attachment;

/// An attachment with its content base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAttachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub content: String,
}

impl From<&Attachment> for EncodedAttachment {
    fn from(attachment: &Attachment) -> Self {
        Self {
            filename: attachment.filename.clone(),
            content_type: attachment.content_type.clone(),
            content: STANDARD.encode(&attachment.content),
        }
    }
}

impl TryFrom<&EncodedAttachment> for Attachment {
    type Error = base64::DecodeError;

    fn try_from(encoded: &EncodedAttachment) -> Result<Self, Self::Error> {
        Ok(Self {
            filename: encoded.filename.clone(),
            content_type: encoded.content_type.clone(),
            content: STANDARD.decode(&encoded.content)?,
        })
    }
}

pub fn encode_attachments(attachments: &[Attachment]) -> Vec<EncodedAttachment> {
    attachments.iter().map(EncodedAttachment::from).collect()
}

pub fn decode_attachments(
    attachments: &[EncodedAttachment],
) -> Result<Vec<Attachment>, base64::DecodeError> {
    attachments.iter().map(Attachment::try_from).collect()
}
