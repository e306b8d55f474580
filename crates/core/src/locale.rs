//! Localized notice texts posted by the agent.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Locale {
    #[default]
    #[serde(rename = "en_US")]
    EnUs,
    #[serde(rename = "cs_CZ")]
    CsCz,
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().replace('-', "_").to_ascii_lowercase().as_str() {
            "en_us" | "en" => Ok(Self::EnUs),
            "cs_cz" | "cs" => Ok(Self::CsCz),
            other => Err(format!("unsupported locale `{other}` (expected en_US|cs_CZ)")),
        }
    }
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EnUs => "en_US",
            Self::CsCz => "cs_CZ",
        }
    }

    /// Attribution line placed above a replicated message body.
    pub fn message_from(&self, display_name: &str, email: &str) -> String {
        match self {
            Self::EnUs => format!("Message from {display_name} ({email}):  \n\n"),
            Self::CsCz => format!("Zpráva od {display_name} ({email}):  \n\n"),
        }
    }

    pub fn outside_org(&self, org_name: &str) -> String {
        match self {
            Self::EnUs => {
                format!("I am allowed to communicate only in Spaces owned by **{org_name}**")
            }
            Self::CsCz => {
                format!("Mám dovoleno komunikovat pouze v Prostorech vlastněných **{org_name}**")
            }
        }
    }

    pub fn space_moderated(&self, title: &str, link: Option<&str>) -> String {
        let space = match link {
            Some(link) => format!("[{title}]({link})"),
            None => format!("**{title}**"),
        };
        match self {
            Self::EnUs => {
                format!("Space {space} is **Announcement only**, please make sure I am a moderator")
            }
            Self::CsCz => format!(
                "Prostor {space} je v **režimu oznamování**, přidejte mě, prosím, mezi moderátory"
            ),
        }
    }

    pub fn attachment_failed(&self, file: &str) -> String {
        match self {
            Self::EnUs => format!(
                "Your message was not broadcast: the attachment `{file}` could not be downloaded."
            ),
            Self::CsCz => {
                format!("Vaše zpráva nebyla rozeslána: přílohu `{file}` se nepodařilo stáhnout.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Locale;

    #[test]
    fn parses_locale_codes_loosely() {
        assert_eq!("en_US".parse::<Locale>(), Ok(Locale::EnUs));
        assert_eq!("cs-CZ".parse::<Locale>(), Ok(Locale::CsCz));
        assert!("de_DE".parse::<Locale>().is_err());
    }

    #[test]
    fn moderation_notice_links_space_when_available() {
        let linked = Locale::EnUs.space_moderated("Ops", Some("webexteams://im?space=abc"));
        assert!(linked.contains("[Ops](webexteams://im?space=abc)"));

        let plain = Locale::CsCz.space_moderated("Ops", None);
        assert!(plain.contains("**Ops**"));
    }
}
