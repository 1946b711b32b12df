use crate::error::{PipelineError, PipelineResult};
use chrono::NaiveDate;
use log::{debug, info};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::Path;

/// Feature names in the world map that the transaction data spells
/// differently: (map name, transaction name).
pub const COUNTRY_ALIASES: [(&str, &str); 3] = [
    ("England", "United Kingdom"),
    ("Ireland", "EIRE"),
    ("South Africa", "RSA"),
];

/// Top-level members written by the aggregator. Stale copies in the input
/// are discarded when the collection is read.
const SUMMARY_MEMBERS: [&str; 3] = ["earliestDate", "latestDate", "maximumTotalRevenue"];

/// A feature, kept as its raw member map so `type`, `properties`,
/// `geometry` and anything else round-trip untouched and in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Feature {
    pub members: Map<String, Value>,
}

impl Feature {
    /// `None` when `properties` is absent, `null`, or not an object.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.members.get("properties").and_then(Value::as_object)
    }

    pub fn properties_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.members
            .get_mut("properties")
            .and_then(Value::as_object_mut)
    }

    pub fn name(&self) -> Option<&str> {
        self.properties()?.get("name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    /// Every top-level member except `features` and the summary fields,
    /// in input order.
    pub members: Map<String, Value>,
    /// Index into `members` where `features` appeared.
    features_at: usize,
    pub features: Vec<Feature>,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub maximum_total_revenue: Option<f64>,
}

impl<'de> Deserialize<'de> for FeatureCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = Map::<String, Value>::deserialize(deserializer)?;
        let mut members = Map::new();
        let mut features = None;
        let mut features_at = 0;
        for (key, value) in document {
            if key == "features" {
                features_at = members.len();
                features = Some(Vec::<Feature>::deserialize(value).map_err(D::Error::custom)?);
            } else if !SUMMARY_MEMBERS.contains(&key.as_str()) {
                members.insert(key, value);
            }
        }
        let features = features.ok_or_else(|| D::Error::missing_field("features"))?;
        Ok(FeatureCollection {
            members,
            features_at,
            features,
            earliest_date: None,
            latest_date: None,
            maximum_total_revenue: None,
        })
    }
}

impl Serialize for FeatureCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (i, (key, value)) in self.members.iter().enumerate() {
            if i == self.features_at {
                map.serialize_entry("features", &self.features)?;
            }
            map.serialize_entry(key, value)?;
        }
        if self.features_at >= self.members.len() {
            map.serialize_entry("features", &self.features)?;
        }
        map.serialize_entry("earliestDate", &self.earliest_date)?;
        map.serialize_entry("latestDate", &self.latest_date)?;
        map.serialize_entry("maximumTotalRevenue", &self.maximum_total_revenue)?;
        map.end()
    }
}

pub fn load_geo(path: &Path) -> PipelineResult<FeatureCollection> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let collection: FeatureCollection = serde_json::from_str(&text)?;
    info!(
        "Loaded {} features from {}",
        collection.features.len(),
        path.display()
    );
    Ok(collection)
}

/// Rename features whose name is a known alias of a transaction country.
/// Names are matched exactly; everything else is left alone.
/// Returns how many features were renamed.
pub fn normalize_names(collection: &mut FeatureCollection) -> usize {
    let mut renamed = 0;
    for feature in &mut collection.features {
        let Some(name) = feature.name() else {
            continue;
        };
        let Some(&(from, to)) = COUNTRY_ALIASES.iter().find(|(from, _)| *from == name) else {
            continue;
        };
        let Some(properties) = feature.properties_mut() else {
            continue;
        };
        debug!("Renaming feature {:?} to {:?}", from, to);
        properties.insert("name".to_string(), Value::String(to.to_string()));
        renamed += 1;
    }
    renamed
}
