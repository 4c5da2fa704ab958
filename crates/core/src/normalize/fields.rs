use crate::domain::lead::CustomField;

/// Lead custom fields the pipeline reads, independent of their display names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeadField {
    Administrator,
    TrafficSource,
    ProcessingSpeed,
}

const FIELD_ALIASES: &[(LeadField, &[&str])] = &[
    (LeadField::Administrator, &["Администратор"]),
    (LeadField::TrafficSource, &["Источник трафика"]),
    (LeadField::ProcessingSpeed, &["Скорость обработки", "Скорость обработки заявки"]),
];

pub const UNKNOWN_ADMINISTRATOR: &str = "Неизвестный";
pub const UNDETERMINED_SOURCE: &str = "Неопределенный";
pub const ZERO_PROCESSING_SPEED: &str = "0 мин";

const PROCESSING_SPEED_MINUTES: &[(&str, u32)] = &[
    ("0 мин", 0),
    ("5-10 мин", 5),
    ("10-15 мин", 10),
    ("15-30 мин", 15),
    ("30-1 час", 30),
    ("1-3 часа", 60),
    ("3-6 часов", 180),
    ("6-12 часов", 360),
    ("12-1 день", 720),
    ("1-3 дня", 1440),
];

impl LeadField {
    pub fn aliases(self) -> &'static [&'static str] {
        FIELD_ALIASES
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    pub fn default_value(self) -> &'static str {
        match self {
            Self::Administrator => UNKNOWN_ADMINISTRATOR,
            Self::TrafficSource => UNDETERMINED_SOURCE,
            Self::ProcessingSpeed => ZERO_PROCESSING_SPEED,
        }
    }

    pub fn matches(self, display_name: &str) -> bool {
        let wanted = display_name.trim().to_lowercase();
        self.aliases().iter().any(|alias| alias.to_lowercase() == wanted)
    }
}

/// First non-empty value of `field`, or its default when the lead lacks it.
pub fn field_value(fields: &[CustomField], field: LeadField) -> String {
    fields
        .iter()
        .filter(|candidate| field.matches(&candidate.name))
        .find_map(|candidate| candidate.value.clone())
        .unwrap_or_else(|| field.default_value().to_string())
}

pub fn processing_speed_minutes(label: &str) -> u32 {
    let normalized = label.trim().replace(" - ", "-").replace(" -", "-").replace("- ", "-");

    if let Some((_, minutes)) = PROCESSING_SPEED_MINUTES.iter().find(|(known, _)| *known == normalized)
    {
        return *minutes;
    }

    if normalized.contains("мин") {
        let leading = normalized.replace("мин", "");
        return leading
            .trim()
            .split('-')
            .next()
            .and_then(|number| number.trim().parse::<u32>().ok())
            .unwrap_or(0);
    }

    0
}

#[cfg(test)]
mod tests {
    use super::{field_value, processing_speed_minutes, LeadField};
    use crate::domain::lead::CustomField;

    fn field(name: &str, value: Option<&str>) -> CustomField {
        CustomField { name: name.to_string(), value: value.map(str::to_string) }
    }

    #[test]
    fn alias_lookup_is_case_insensitive() {
        let fields = vec![
            field("АДМИНИСТРАТОР", Some("Мария")),
            field("скорость обработки заявки", Some("5 - 10 мин")),
        ];

        assert_eq!(field_value(&fields, LeadField::Administrator), "Мария");
        assert_eq!(field_value(&fields, LeadField::ProcessingSpeed), "5 - 10 мин");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let fields = vec![field("Источник трафика", None)];

        assert_eq!(field_value(&fields, LeadField::Administrator), "Неизвестный");
        assert_eq!(field_value(&fields, LeadField::TrafficSource), "Неопределенный");
        assert_eq!(field_value(&fields, LeadField::ProcessingSpeed), "0 мин");
    }

    #[test]
    fn known_speed_labels_map_through_the_table() {
        assert_eq!(processing_speed_minutes("0 мин"), 0);
        assert_eq!(processing_speed_minutes("5 - 10 мин"), 5);
        assert_eq!(processing_speed_minutes("30 -1 час"), 30);
        assert_eq!(processing_speed_minutes("1-3 часа"), 60);
        assert_eq!(processing_speed_minutes("12- 1 день"), 720);
        assert_eq!(processing_speed_minutes("1-3 дня"), 1440);
    }

    #[test]
    fn unknown_labels_use_leading_minutes_or_zero() {
        assert_eq!(processing_speed_minutes("40-50 мин"), 40);
        assert_eq!(processing_speed_minutes("7 мин"), 7);
        assert_eq!(processing_speed_minutes("больше недели"), 0);
        assert_eq!(processing_speed_minutes("много мин"), 0);
    }
}
