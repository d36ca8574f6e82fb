use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::derived::DerivedMetrics;
use crate::record::SensorRecord;
use crate::telemetry::ChannelValues;

/// Remote timestamp format, UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The JSON shape of one uploaded record: every column except the local row
/// id and the `synced` flag.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteRow {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: i64,
    #[serde(flatten)]
    pub values: ChannelValues,
    #[serde(flatten)]
    pub derived: DerivedMetrics,
}

impl From<&SensorRecord> for RemoteRow {
    fn from(record: &SensorRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            values: record.values,
            derived: record.derived,
        }
    }
}

/// Format epoch millis as `YYYY-MM-DD HH:MM:SS` (UTC).
#[must_use]
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn serialize_timestamp<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Channel;
    use serde_json::json;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000_999), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_row_shape() {
        let mut record = SensorRecord::new(
            1_700_000_000_000,
            ChannelValues::new().with(Channel::CstrTemp, 31.5),
            DerivedMetrics { flux: Some(-2.0), ..Default::default() },
        );
        record.id = Some(9);
        record.synced = true;

        let row = serde_json::to_value(RemoteRow::from(&record)).unwrap();
        let obj = row.as_object().unwrap();

        assert_eq!(obj.len(), 1 + Channel::COUNT + DerivedMetrics::COLUMNS.len());
        assert_eq!(row["timestamp"], json!("2023-11-14 22:13:20"));
        assert_eq!(row["cstr_temp"], json!(31.5));
        assert_eq!(row["ds_ec"], json!(null));
        assert_eq!(row["flux"], json!(-2.0));
        assert_eq!(row["vol_to_ds"], json!(null));
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("synced"));
    }
}
