use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

/// Why a feature stopped being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LossReason {
    /// No candidate was available when the slot was filled.
    NotFound,
    /// The tracking equations were singular.
    SmallDeterminant,
    /// The iteration cap was reached without convergence.
    MaxIterations,
    /// The window left the image or the border margin.
    OutOfBounds,
    /// The intensity difference at the tracked position was too large.
    LargeResidue,
}

impl LossReason {
    /// The status code used in exchange records.
    pub fn code(&self) -> i32 {
        match self {
            LossReason::NotFound => -1,
            LossReason::SmallDeterminant => -2,
            LossReason::MaxIterations => -3,
            LossReason::OutOfBounds => -4,
            LossReason::LargeResidue => -5,
        }
    }

    /// Parse a negative status code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(LossReason::NotFound),
            -2 => Some(LossReason::SmallDeterminant),
            -3 => Some(LossReason::MaxIterations),
            -4 => Some(LossReason::OutOfBounds),
            -5 => Some(LossReason::LargeResidue),
            _ => None,
        }
    }
}

impl std::fmt::Display for LossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            LossReason::NotFound => "not found",
            LossReason::SmallDeterminant => "small determinant",
            LossReason::MaxIterations => "max iterations",
            LossReason::OutOfBounds => "out of bounds",
            LossReason::LargeResidue => "large residue",
        };
        write!(f, "{name}")
    }
}

/// A slot of a [`FeatureList`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Feature {
    /// A feature that is currently followed.
    Tracked {
        /// Column in pixels.
        x: f32,
        /// Row in pixels.
        y: f32,
        /// The score given at selection, 0 once the feature has been tracked.
        trackability: i32,
    },
    /// A feature that can only be revived by the selector.
    Lost(LossReason),
}

impl Feature {
    /// Whether the feature is currently tracked.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Feature::Tracked { .. })
    }

    /// The position of a tracked feature.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            Feature::Tracked { x, y, .. } => Some((*x, *y)),
            Feature::Lost(_) => None,
        }
    }

    /// The status code, trackability for tracked features and a negative code otherwise.
    pub fn status(&self) -> i32 {
        match self {
            Feature::Tracked { trackability, .. } => *trackability,
            Feature::Lost(reason) => reason.code(),
        }
    }

    /// Convert to the exchange representation, lost features sit at `(-1, -1)`.
    pub fn to_record(&self) -> FeatureRecord {
        match self {
            Feature::Tracked { x, y, trackability } => FeatureRecord {
                x: *x,
                y: *y,
                status: *trackability,
            },
            Feature::Lost(reason) => FeatureRecord {
                x: -1.0,
                y: -1.0,
                status: reason.code(),
            },
        }
    }
}

/// The `(x, y, status)` triple features are exchanged as.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct FeatureRecord {
    /// Column in pixels, -1 for lost features.
    pub x: f32,
    /// Row in pixels, -1 for lost features.
    pub y: f32,
    /// Non negative when tracked, a loss code otherwise.
    pub status: i32,
}

impl TryFrom<FeatureRecord> for Feature {
    type Error = TrackingError;

    fn try_from(record: FeatureRecord) -> Result<Self, Self::Error> {
        if record.status >= 0 {
            return Ok(Feature::Tracked {
                x: record.x,
                y: record.y,
                trackability: record.status,
            });
        }
        LossReason::from_code(record.status)
            .map(Feature::Lost)
            .ok_or(TrackingError::InvalidFeatureStatus(record.status))
    }
}

/// A fixed size table of features.
///
/// Slots are never added or removed, they are overwritten by the tracker and
/// refilled by the selector.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureList {
    features: Vec<Feature>,
}

impl FeatureList {
    /// Create a list of `n` empty slots.
    pub fn new(n: usize) -> Self {
        Self {
            features: vec![Feature::Lost(LossReason::NotFound); n],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the list has no slots.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Get a slot.
    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    /// Iterate over the slots.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// The slots as a slice.
    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }

    /// The slots as a mutable slice, the length stays fixed.
    pub fn as_mut_slice(&mut self) -> &mut [Feature] {
        &mut self.features
    }

    /// Number of tracked features.
    pub fn count_remaining(&self) -> usize {
        self.features.iter().filter(|f| f.is_tracked()).count()
    }

    /// Number of lost features.
    pub fn count_lost(&self) -> usize {
        self.len() - self.count_remaining()
    }

    /// Export every slot as a record.
    pub fn to_records(&self) -> Vec<FeatureRecord> {
        self.features.iter().map(Feature::to_record).collect()
    }

    /// Rebuild a list from records.
    ///
    /// # Errors
    ///
    /// Fails on a negative status that is not a known loss code.
    pub fn from_records(records: &[FeatureRecord]) -> Result<Self, TrackingError> {
        let features = records
            .iter()
            .map(|r| Feature::try_from(*r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { features })
    }

    /// Encode the records of the list with bincode.
    pub fn encode(&self) -> Result<Vec<u8>, TrackingError> {
        bincode::encode_to_vec(self.to_records(), bincode::config::standard())
            .map_err(|e| TrackingError::FeatureListEncode(e.to_string()))
    }

    /// Decode a list produced by [`FeatureList::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, TrackingError> {
        let (records, _): (Vec<FeatureRecord>, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| TrackingError::FeatureListDecode(e.to_string()))?;
        Self::from_records(&records)
    }
}

impl std::ops::Index<usize> for FeatureList {
    type Output = Feature;

    fn index(&self, index: usize) -> &Self::Output {
        &self.features[index]
    }
}

impl<'a> IntoIterator for &'a FeatureList {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_list_is_not_found() {
        let list = FeatureList::new(4);
        assert_eq!(list.len(), 4);
        assert_eq!(list.count_remaining(), 0);
        assert_eq!(list.count_lost(), 4);
        assert!(list
            .iter()
            .all(|f| *f == Feature::Lost(LossReason::NotFound)));
    }

    #[test]
    fn loss_codes() {
        for reason in [
            LossReason::NotFound,
            LossReason::SmallDeterminant,
            LossReason::MaxIterations,
            LossReason::OutOfBounds,
            LossReason::LargeResidue,
        ] {
            assert!(reason.code() < 0);
            assert_eq!(LossReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(LossReason::OutOfBounds.code(), -4);
        assert_eq!(LossReason::from_code(-6), None);
        assert_eq!(LossReason::from_code(0), None);
    }

    #[test]
    fn lost_records_use_sentinel() {
        let record = Feature::Lost(LossReason::LargeResidue).to_record();
        assert_eq!(
            record,
            FeatureRecord {
                x: -1.0,
                y: -1.0,
                status: -5
            }
        );
    }

    #[test]
    fn invalid_status_rejected() {
        let records = [FeatureRecord {
            x: 1.0,
            y: 1.0,
            status: -9,
        }];
        assert_eq!(
            FeatureList::from_records(&records),
            Err(TrackingError::InvalidFeatureStatus(-9))
        );
    }

    #[test]
    fn encode_decode() -> Result<(), TrackingError> {
        let mut list = FeatureList::new(3);
        list.as_mut_slice()[0] = Feature::Tracked {
            x: 12.5,
            y: 3.25,
            trackability: 420,
        };
        list.as_mut_slice()[2] = Feature::Lost(LossReason::SmallDeterminant);

        let decoded = FeatureList::decode(&list.encode()?)?;
        assert_eq!(decoded, list);
        assert_eq!(decoded[0].position(), Some((12.5, 3.25)));
        assert_eq!(decoded[2].status(), -2);

        Ok(())
    }

    #[test]
    fn decode_garbage() {
        assert!(matches!(
            FeatureList::decode(&[0xff, 0xff, 0xff]),
            Err(TrackingError::FeatureListDecode(_))
        ));
    }
}
