use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::Arc,
};

use folio_state::{Album, Artist, ArtistAttribute};
use smallvec::SmallVec;

use crate::{CatalogError, CatalogResult, ordered_index::Comparator};

pub type Attributes = SmallVec<[ArtistAttribute; 3]>;

/// A named, composite ordering: the first attribute is primary, the rest break ties in
/// the order given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub name: String,
    pub attributes: Attributes,
}

/// The sort keys that can be selected by name.
#[derive(Debug, Clone)]
pub struct SortKeys {
    keys: HashMap<String, Attributes>,
}
impl Default for SortKeys {
    fn default() -> Self {
        use ArtistAttribute::*;

        let keys = [
            ("name", &[Name][..]),
            ("sort_name", &[SortName, Name][..]),
            ("album_count", &[AlbumCount, Name][..]),
        ]
        .into_iter()
        .map(|(name, attributes)| (name.to_string(), Attributes::from_slice(attributes)))
        .collect();

        Self { keys }
    }
}
impl SortKeys {
    /// The built-in keys, with `overrides` added on top (replacing built-ins of the same
    /// name). Keys with no attributes are ignored.
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<ArtistAttribute>>) -> Self {
        let mut sort_keys = Self::default();
        for (name, attributes) in overrides {
            if attributes.is_empty() {
                tracing::warn!("Ignoring sort key `{name}` with no attributes");
                continue;
            }
            sort_keys
                .keys
                .insert(name.clone(), Attributes::from_slice(attributes));
        }
        sort_keys
    }

    pub fn get(&self, name: &str) -> CatalogResult<SortKey> {
        let attributes = self
            .keys
            .get(name)
            .ok_or_else(|| CatalogError::UnknownSortKey(name.to_string()))?;
        Ok(SortKey {
            name: name.to_string(),
            attributes: attributes.clone(),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Locale-aware string comparison that ignores case and diacritics.
#[derive(Clone)]
pub struct Collation {
    compare: Rc<dyn Fn(&str, &str) -> Ordering>,
}
impl Collation {
    pub fn new() -> CatalogResult<Self> {
        let mut collator_preferences = icu_collator::CollatorPreferences::default();
        collator_preferences.numeric_ordering =
            Some(icu_collator::preferences::CollationNumericOrdering::True);

        let mut collator_options = icu_collator::options::CollatorOptions::default();
        collator_options.strength = Some(icu_collator::options::Strength::Primary);
        collator_options.case_level = Some(icu_collator::options::CaseLevel::Off);

        let collator = icu_collator::Collator::try_new(collator_preferences, collator_options)
            .map_err(|e| CatalogError::Collation(e.to_string()))?;

        Ok(Self {
            compare: Rc::new(move |a: &str, b: &str| collator.compare(a, b)),
        })
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        (self.compare)(a, b)
    }

    /// Orders artists by `key`. Artists that the key considers equal fall back to a
    /// byte-wise comparison of their names, so no two distinct artists ever tie.
    pub fn artist_comparator(&self, key: &SortKey) -> Comparator<Arc<Artist>> {
        let collation = self.clone();
        let attributes = key.attributes.clone();
        Comparator::new(move |a: &Arc<Artist>, b: &Arc<Artist>| {
            attributes
                .iter()
                .map(|attribute| collation.compare_by(*attribute, a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.name.cmp(&b.name))
        })
    }

    /// Albums within an artist: oldest first, then by name.
    pub fn album_comparator(&self) -> Comparator<Arc<Album>> {
        let collation = self.clone();
        Comparator::new(move |a: &Arc<Album>, b: &Arc<Album>| {
            let by_year = match (a.year, b.year) {
                (Some(y1), Some(y2)) => y1.cmp(&y2),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_year.then_with(|| collation.compare(&a.name, &b.name))
        })
    }

    fn compare_by(&self, attribute: ArtistAttribute, a: &Artist, b: &Artist) -> Ordering {
        match attribute {
            ArtistAttribute::Name => self.compare(&a.name, &b.name),
            ArtistAttribute::SortName => {
                self.compare(a.effective_sort_name(), b.effective_sort_name())
            }
            ArtistAttribute::AlbumCount => a.album_count.cmp(&b.album_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(name: &str) -> Arc<Artist> {
        Arc::new(Artist::new(name))
    }

    fn sorted(comparator: &Comparator<Arc<Artist>>, mut artists: Vec<Arc<Artist>>) -> Vec<String> {
        artists.sort_by(|a, b| comparator.compare(a, b));
        artists.iter().map(|a| a.name.to_string()).collect()
    }

    #[test]
    fn test_case_and_diacritics_do_not_affect_order() {
        let collation = Collation::new().unwrap();
        assert_eq!(collation.compare("ABBA", "abba"), Ordering::Equal);
        assert_eq!(collation.compare("Élan", "elan"), Ordering::Equal);

        let by_name = collation.artist_comparator(&SortKeys::default().get("name").unwrap());
        assert_ne!(
            by_name.compare(&artist("ABBA"), &artist("abba")),
            Ordering::Equal
        );

        let names = sorted(
            &by_name,
            vec![artist("Élan"), artist("bowie"), artist("eagles"), artist("Abba")],
        );
        assert_eq!(names, vec!["Abba", "bowie", "eagles", "Élan"]);
    }

    #[test]
    fn test_numeric_ordering() {
        let collation = Collation::new().unwrap();
        assert_eq!(collation.compare("Blink 2", "Blink 10"), Ordering::Less);
    }

    #[test]
    fn test_composite_key_breaks_ties_in_order() {
        let collation = Collation::new().unwrap();
        let mut many = Artist::new("Zappa");
        many.album_count = 3;
        let mut few_b = Artist::new("Bowie");
        few_b.album_count = 1;
        let mut few_a = Artist::new("Abba");
        few_a.album_count = 1;

        let by_count = collation.artist_comparator(&SortKeys::default().get("album_count").unwrap());
        let names = sorted(
            &by_count,
            vec![Arc::new(many), Arc::new(few_b), Arc::new(few_a)],
        );
        assert_eq!(names, vec!["Abba", "Bowie", "Zappa"]);
    }

    #[test]
    fn test_sort_name_falls_back_to_name() {
        let collation = Collation::new().unwrap();
        let mut beatles = Artist::new("The Beatles");
        beatles.sort_name = Some("Beatles, The".into());
        let by_sort_name = collation.artist_comparator(&SortKeys::default().get("sort_name").unwrap());
        let names = sorted(
            &by_sort_name,
            vec![artist("Cream"), Arc::new(beatles), artist("Abba")],
        );
        assert_eq!(names, vec!["Abba", "The Beatles", "Cream"]);
    }

    #[test]
    fn test_overrides_and_unknown_keys() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "busiest".to_string(),
            vec![ArtistAttribute::AlbumCount, ArtistAttribute::SortName],
        );
        overrides.insert("empty".to_string(), vec![]);
        let keys = SortKeys::with_overrides(&overrides);

        assert_eq!(
            keys.get("busiest").unwrap().attributes.as_slice(),
            &[ArtistAttribute::AlbumCount, ArtistAttribute::SortName]
        );
        assert!(matches!(keys.get("empty"), Err(CatalogError::UnknownSortKey(_))));
        assert!(matches!(keys.get("nope"), Err(CatalogError::UnknownSortKey(_))));
        assert_eq!(keys.names(), vec!["album_count", "busiest", "name", "sort_name"]);
    }
}
