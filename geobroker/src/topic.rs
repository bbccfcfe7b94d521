use std::fmt::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TopicError {
    #[error("InvalidTopic({0})")]
    InvalidTopic(String),
    #[error("InvalidLevel({0})")]
    InvalidLevel(String),
}

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash)]
pub enum Level {
    Normal(String),
    Blank,
    SingleWildcard, // Single level wildcard +
    MultiWildcard,  // Multi-level wildcard #
}

impl Level {
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(*self, Level::SingleWildcard | Level::MultiWildcard)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        match *self {
            Level::Normal(ref s) => !s.contains(['+', '#']),
            _ => true,
        }
    }
}

/// A parsed topic name (publish side) or topic filter (subscribe side).
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(Vec<Level>);

impl Topic {
    #[inline]
    pub fn levels(&self) -> &Vec<Level> {
        &self.0
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0
            .iter()
            .position(|level| !level.is_valid())
            .or_else(|| {
                self.0.iter().enumerate().position(|(pos, level)| match *level {
                    Level::MultiWildcard => pos != self.0.len() - 1,
                    _ => false,
                })
            })
            .is_none()
    }

    /// True if the topic contains no wildcard, i.e. it may be published to.
    #[inline]
    pub fn is_name(&self) -> bool {
        !self.0.iter().any(Level::is_wildcard)
    }

    /// Check whether this topic filter matches the topic name `topic`.
    pub fn matches(&self, topic: &Topic) -> bool {
        let mut lhs = self.0.iter();

        for rhs in topic.0.iter() {
            match lhs.next() {
                Some(&Level::SingleWildcard) => {}
                Some(&Level::MultiWildcard) => return true,
                Some(level) if level == rhs => continue,
                _ => return false,
            }
        }

        match lhs.next() {
            Some(&Level::MultiWildcard) => lhs.next().is_none(),
            Some(_) => false,
            None => true,
        }
    }
}

impl From<Vec<Level>> for Topic {
    fn from(v: Vec<Level>) -> Self {
        Topic(v)
    }
}

impl From<Topic> for String {
    fn from(t: Topic) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Topic::from_str(&s)
    }
}

#[macro_export]
macro_rules! topic {
    ($s:expr) => {
        $s.parse::<$crate::topic::Topic>()
    };
}

impl FromStr for Level {
    type Err = TopicError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, TopicError> {
        match s {
            "+" => Ok(Level::SingleWildcard),
            "#" => Ok(Level::MultiWildcard),
            "" => Ok(Level::Blank),
            _ => {
                if s.contains(['+', '#']) {
                    Err(TopicError::InvalidLevel(format!("invalid level `{}` contains +|#", s)))
                } else {
                    Ok(Level::Normal(String::from(s)))
                }
            }
        }
    }
}

impl FromStr for Topic {
    type Err = TopicError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, TopicError> {
        s.split('/').map(Level::from_str).collect::<Result<Vec<_>, TopicError>>().map(Topic).and_then(|topic| {
            if topic.is_valid() {
                Ok(topic)
            } else {
                Err(TopicError::InvalidTopic(format!("invalid topic `{}`", s)))
            }
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Normal(ref s) => f.write_str(s.as_str()),
            Level::Blank => Ok(()),
            Level::SingleWildcard => f.write_char('+'),
            Level::MultiWildcard => f.write_char('#'),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for level in &self.0 {
            if first {
                first = false;
            } else {
                f.write_char('/')?;
            }

            level.fmt(f)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(s: &str) -> Level {
        Level::Normal(s.into())
    }

    fn matches(filter: &str, name: &str) -> bool {
        topic!(filter).unwrap().matches(&topic!(name).unwrap())
    }

    #[test]
    fn test_level() {
        assert_eq!(normal("sport"), "sport".parse().unwrap());
        assert_eq!("".parse::<Level>().unwrap(), Level::Blank);
        assert_eq!("+".parse::<Level>().unwrap(), Level::SingleWildcard);
        assert!("sp+ort".parse::<Level>().is_err());

        assert!(normal("sport").is_valid());
        assert!(!normal("sport#").is_valid());
        assert!(Level::SingleWildcard.is_wildcard());
        assert!(!normal("sport").is_wildcard());
    }

    #[test]
    fn test_valid_topic() {
        assert!(Topic(vec![normal("sport"), normal("tennis"), normal("player1")]).is_valid());
        assert!(Topic(vec![normal("sport"), normal("tennis"), Level::MultiWildcard]).is_valid());
        assert!(Topic(vec![normal("sport"), Level::SingleWildcard, normal("player1")]).is_valid());
        assert!(!Topic(vec![normal("sport"), Level::MultiWildcard, normal("player1")]).is_valid());
    }

    #[test]
    fn test_parse_topic() {
        assert_eq!(
            topic!("sport/tennis/player1").unwrap(),
            Topic::from(vec![normal("sport"), normal("tennis"), normal("player1")])
        );

        assert_eq!(topic!("").unwrap(), Topic(vec![Level::Blank]));
        assert_eq!(topic!("/finance").unwrap(), Topic::from(vec![Level::Blank, normal("finance")]));

        assert!("sport/tennis#".parse::<Topic>().is_err());
        assert!("sport/tennis/#/ranking".parse::<Topic>().is_err());
        assert!("sport+".parse::<Topic>().is_err());

        assert!(topic!("sport/tennis").unwrap().is_name());
        assert!(!topic!("sport/+").unwrap().is_name());
        assert!(!topic!("#").unwrap().is_name());
    }

    #[test]
    fn test_display_and_serde() {
        let t: Topic = vec![Level::SingleWildcard, normal("tennis"), Level::MultiWildcard].into();
        assert_eq!(t.to_string(), "+/tennis/#");

        assert_eq!(serde_json::to_string(&t).unwrap(), r#""+/tennis/#""#);
        assert_eq!(serde_json::from_str::<Topic>(r#""+/tennis/#""#).unwrap(), t);
        assert!(serde_json::from_str::<Topic>(r#""a/#/b""#).is_err());
    }

    #[test]
    fn test_matches() {
        assert!(matches("sport/tennis/player1/#", "sport/tennis/player1"));
        assert!(matches("sport/tennis/player1/#", "sport/tennis/player1/ranking"));
        assert!(matches("sport/tennis/player1/#", "sport/tennis/player1/score/wimbledon"));
        assert!(matches("sport/#", "sport"));
        assert!(matches("#", "sport/tennis"));

        assert!(matches("sport/tennis/+", "sport/tennis/player1"));
        assert!(!matches("sport/tennis/+", "sport/tennis/player1/ranking"));
        assert!(!matches("sport/+", "sport"));
        assert!(matches("sport/+", "sport/"));

        assert!(matches("+/+", "/finance"));
        assert!(matches("/+", "/finance"));
        assert!(!matches("+", "/finance"));
    }
}
