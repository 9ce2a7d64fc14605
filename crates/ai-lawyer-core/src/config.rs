//! Chat configuration.

use serde::{Deserialize, Serialize};

/// Key of the autosave snapshot in the key/value store.
pub const DEFAULT_STORAGE_KEY: &str = "chatHistory";

/// Prefix of exported file names.
pub const DEFAULT_EXPORT_PREFIX: &str = "ai-lawyer-chat";

/// Largest accepted attachment (4 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 4 * 1024 * 1024;

const SYSTEM_INSTRUCTION: &str = "Ти - AI-Юрист, досвідчений консультант з цивільного та \
адміністративного права України. Відповідай українською мовою, посилайся на чинні норми \
законодавства, пояснюй процесуальні кроки простими словами та попереджай, що твоя відповідь \
не замінює консультацію адвоката.";

const GREETING: &str = "Вітаю! Я ваш AI-Юрист. Чим можу допомогти у вашій цивільній чи \
адміністративній справі? Ви можете також додавати файли-зображення (JPEG, PNG, WEBP, \
HEIC/HEIF) розміром до 4МБ.";

const ERROR_NOTICE: &str = "Вибачте, сталася помилка. Спробуйте ще раз.";

/// Chat configuration.
///
/// Every field has a default, so a partial config file is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Key under which the message log is autosaved.
    pub storage_key: String,
    /// System instruction for every transport session.
    pub system_instruction: String,
    /// Text of the synthetic greeting.
    pub greeting: String,
    /// Text of the message appended after a transport failure.
    pub error_notice: String,
    /// Prefix of exported file names.
    pub export_prefix: String,
    pub max_attachment_bytes: usize,
    pub supported_mime_types: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            greeting: GREETING.to_string(),
            error_notice: ERROR_NOTICE.to_string(),
            export_prefix: DEFAULT_EXPORT_PREFIX.to_string(),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            supported_mime_types: ["image/jpeg", "image/png", "image/webp", "image/heic", "image/heif"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ChatConfig {
    /// Whether an attachment MIME type is accepted.
    #[must_use]
    pub fn supports_mime_type(&self, mime_type: &str) -> bool {
        self.supported_mime_types.iter().any(|m| m == mime_type)
    }

    /// Export file name for the given instant.
    ///
    /// `:` and `.` of the ISO-8601 timestamp become `-`.
    #[must_use]
    pub fn export_file_name(&self, at: chrono::DateTime<chrono::Utc>) -> String {
        let stamp = at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}-{stamp}.json", self.export_prefix)
    }
}
