use serde::{Deserialize, Serialize};

/// 引用格式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CitationStyle {
    #[serde(rename = "apa")]
    #[default]
    Apa,
    #[serde(rename = "mla")]
    Mla,
    #[serde(rename = "chicago")]
    Chicago,
    #[serde(rename = "harvard")]
    Harvard,
    #[serde(rename = "ieee")]
    Ieee,
    #[serde(rename = "vancouver")]
    Vancouver,
}

impl std::fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CitationStyle::Apa => write!(f, "apa"),
            CitationStyle::Mla => write!(f, "mla"),
            CitationStyle::Chicago => write!(f, "chicago"),
            CitationStyle::Harvard => write!(f, "harvard"),
            CitationStyle::Ieee => write!(f, "ieee"),
            CitationStyle::Vancouver => write!(f, "vancouver"),
        }
    }
}

impl std::str::FromStr for CitationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apa" | "apa7" | "apa 7" => Ok(CitationStyle::Apa),
            "mla" | "mla9" => Ok(CitationStyle::Mla),
            "chicago" | "chicago author-date" | "turabian" => Ok(CitationStyle::Chicago),
            "harvard" => Ok(CitationStyle::Harvard),
            "ieee" => Ok(CitationStyle::Ieee),
            "vancouver" | "nlm" => Ok(CitationStyle::Vancouver),
            _ => Err(format!("Unknown citation style: {}", s)),
        }
    }
}

impl CitationStyle {
    /// 获取引用格式的展示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            CitationStyle::Apa => "APA (7th edition)",
            CitationStyle::Mla => "MLA (9th edition)",
            CitationStyle::Chicago => "Chicago (author-date)",
            CitationStyle::Harvard => "Harvard",
            CitationStyle::Ieee => "IEEE",
            CitationStyle::Vancouver => "Vancouver",
        }
    }

    /// 获取引用格式的提示词指令
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            CitationStyle::Apa => {
                "Cite sources in APA style: in-text citations as (Author, Year), reference entries as Author, A. A. (Year). Title. Source. URL"
            }
            CitationStyle::Mla => {
                "Cite sources in MLA style: in-text citations as (Author page), works-cited entries as Author. \"Title.\" Container, Year, URL."
            }
            CitationStyle::Chicago => {
                "Cite sources in Chicago author-date style: in-text citations as (Author Year), reference entries as Author. Year. \"Title.\" Source. URL."
            }
            CitationStyle::Harvard => {
                "Cite sources in Harvard style: in-text citations as (Author Year), reference entries as Author (Year) Title. Available at: URL."
            }
            CitationStyle::Ieee => {
                "Cite sources in IEEE style: numbered in-text citations such as [1], reference entries as [1] A. Author, \"Title,\" Source, Year. [Online]. Available: URL"
            }
            CitationStyle::Vancouver => {
                "Cite sources in Vancouver style: numbered in-text citations such as (1), reference entries as Author AA. Title [Internet]. Year. Available from: URL"
            }
        }
    }

    /// 按当前格式生成参考文献条目，用于模型未给出引用文本的情况
    pub fn format_reference(
        &self,
        authors: &[String],
        year: Option<i32>,
        title: &str,
        url: Option<&str>,
    ) -> String {
        let year = year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".to_string());
        let title = title.trim();

        let mut entry = match self {
            CitationStyle::Apa => match join_authors(authors, "&") {
                Some(names) => format!("{} ({}). {}.", names, year, title),
                None => format!("{}. ({}).", title, year),
            },
            CitationStyle::Mla => match join_authors(authors, "and") {
                Some(names) => format!("{}. \"{}.\" {}", names, title, year),
                None => format!("\"{}.\" {}", title, year),
            },
            CitationStyle::Chicago => match join_authors(authors, "and") {
                Some(names) => format!("{}. {}. \"{}.\"", names, year, title),
                None => format!("\"{}.\" {}.", title, year),
            },
            CitationStyle::Harvard => match join_authors(authors, "and") {
                Some(names) => format!("{} ({}) {}.", names, year, title),
                None => format!("{} ({}).", title, year),
            },
            CitationStyle::Ieee => match join_authors(authors, "and") {
                Some(names) => format!("{}, \"{},\" {}.", names, title, year),
                None => format!("\"{},\" {}.", title, year),
            },
            CitationStyle::Vancouver => match join_authors(authors, ",") {
                Some(names) => format!("{}. {} [Internet]. {}.", names, title, year),
                None => format!("{} [Internet]. {}.", title, year),
            },
        };

        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            let link = match self {
                CitationStyle::Harvard => format!(" Available at: {}", url),
                CitationStyle::Ieee => format!(" [Online]. Available: {}", url),
                CitationStyle::Vancouver => format!(" Available from: {}", url),
                _ => format!(" {}", url),
            };
            entry.push_str(&link);
        }
        entry
    }
}

fn join_authors(authors: &[String], conjunction: &str) -> Option<String> {
    let names: Vec<&str> = authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    match names.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [init @ .., last] if conjunction == "," => {
            Some(format!("{}, {}", init.join(", "), last))
        }
        [init @ .., last] => Some(format!("{} {} {}", init.join(", "), conjunction, last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_style_from_str() {
        assert_eq!("APA".parse::<CitationStyle>().unwrap(), CitationStyle::Apa);
        assert_eq!("mla".parse::<CitationStyle>().unwrap(), CitationStyle::Mla);
        assert_eq!(
            "Chicago".parse::<CitationStyle>().unwrap(),
            CitationStyle::Chicago
        );
        assert!("bibtex".parse::<CitationStyle>().is_err());
    }

    #[test]
    fn test_citation_style_display_round_trips_through_from_str() {
        for style in [
            CitationStyle::Apa,
            CitationStyle::Mla,
            CitationStyle::Chicago,
            CitationStyle::Harvard,
            CitationStyle::Ieee,
            CitationStyle::Vancouver,
        ] {
            assert_eq!(style.to_string().parse::<CitationStyle>().unwrap(), style);
        }
    }

    #[test]
    fn test_format_reference_apa() {
        let authors = vec!["Smith, J.".to_string(), "Doe, A.".to_string()];
        let entry = CitationStyle::Apa.format_reference(
            &authors,
            Some(2021),
            "Remote work and productivity",
            Some("https://example.org/paper"),
        );
        assert_eq!(
            entry,
            "Smith, J. & Doe, A. (2021). Remote work and productivity. https://example.org/paper"
        );
    }

    #[test]
    fn test_format_reference_without_authors_or_year() {
        let entry = CitationStyle::Harvard.format_reference(&[], None, "Annual report", None);
        assert_eq!(entry, "Annual report (n.d.).");
    }
}
