use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const FIELD_NAME: &str = "name";
pub const FIELD_SPECIES: &str = "species";
pub const FIELD_DIET: &str = "diet";
pub const FIELD_PERSONALITY_TRAITS: &str = "personalityTraits";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("validation error: {0}")]
    Validation(ValidationReport),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Animal {
    pub id: String,
    pub name: String,
    pub species: String,
    pub diet: String,
    #[serde(rename = "personalityTraits")]
    pub personality_traits: Vec<String>,
}

impl Animal {
    #[must_use]
    pub fn has_trait(&self, personality_trait: &str) -> bool {
        self.personality_traits.iter().any(|candidate| candidate == personality_trait)
    }
}

/// A candidate record that passed validation but has no identifier yet.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewAnimal {
    pub name: String,
    pub species: String,
    pub diet: String,
    #[serde(rename = "personalityTraits")]
    pub personality_traits: Vec<String>,
}

impl NewAnimal {
    #[must_use]
    pub fn into_animal(self, id: String) -> Animal {
        Animal {
            id,
            name: self.name,
            species: self.species,
            diet: self.diet,
            personality_traits: self.personality_traits,
        }
    }
}

/// Criteria used to narrow the catalog. Every populated criterion must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct AnimalQuery {
    pub personality_traits: Vec<String>,
    pub diet: Option<String>,
    pub species: Option<String>,
    pub name: Option<String>,
    /// Set when a single-valued criterion arrives in list form (`diet[]=...`). No
    /// record's scalar field equals a list, so nothing matches.
    #[serde(default)]
    pub unsatisfiable: bool,
}

impl AnimalQuery {
    /// Build a query from decoded key/value pairs such as a request query string.
    ///
    /// `personalityTraits` (or `personalityTraits[]`) may repeat; each occurrence adds
    /// one required trait. Repeated scalar keys keep the last value. A scalar key in
    /// bracketed list form (`diet[]`, `name[][]`) makes the query unsatisfiable. Empty
    /// values and unknown keys are ignored.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            let key = key.as_ref();
            let key = match key.strip_suffix("[]") {
                Some(FIELD_PERSONALITY_TRAITS) => FIELD_PERSONALITY_TRAITS,
                _ => key,
            };
            match key {
                FIELD_PERSONALITY_TRAITS => query.personality_traits.push(value),
                FIELD_DIET => query.diet = Some(value),
                FIELD_SPECIES => query.species = Some(value),
                FIELD_NAME => query.name = Some(value),
                other if is_list_form_scalar_key(other) => query.unsatisfiable = true,
                _ => {}
            }
        }
        query
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personality_traits.is_empty()
            && self.diet.is_none()
            && self.species.is_none()
            && self.name.is_none()
            && !self.unsatisfiable
    }
}

fn is_list_form_scalar_key(key: &str) -> bool {
    key.split_once('[').is_some_and(|(base, rest)| {
        [FIELD_DIET, FIELD_SPECIES, FIELD_NAME].contains(&base) && rest.ends_with(']')
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    NotAString,
    NotAList,
    TraitNotAString,
}

impl ViolationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::NotAString => "not a string",
            Self::NotAList => "not a list",
            Self::TraitNotAString => "contains a non-string trait",
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub problem: ViolationKind,
}

#[derive(Debug, Clone, Default, Serialize, Eq, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<FieldViolation>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn violated_fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|violation| violation.field).collect()
    }

    fn push(&mut self, field: &'static str, problem: ViolationKind) {
        self.violations.push(FieldViolation { field, problem });
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "no violations");
        }
        let parts = self
            .violations
            .iter()
            .map(|violation| format!("{} {}", violation.field, violation.problem.as_str()))
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join(", "))
    }
}

/// Narrow `animals` to the records satisfying every criterion in `query`.
///
/// Criteria are applied as successive filters in a fixed order: each requested trait,
/// then diet, species and name. Matching is exact and case-sensitive. The input is
/// left untouched and survivors keep their relative order.
#[must_use]
pub fn filter_by_query(query: &AnimalQuery, animals: &[Animal]) -> Vec<Animal> {
    if query.unsatisfiable {
        return Vec::new();
    }
    let mut filtered = animals.to_vec();

    for personality_trait in &query.personality_traits {
        filtered.retain(|animal| animal.has_trait(personality_trait));
    }
    if let Some(diet) = &query.diet {
        filtered.retain(|animal| &animal.diet == diet);
    }
    if let Some(species) = &query.species {
        filtered.retain(|animal| &animal.species == species);
    }
    if let Some(name) = &query.name {
        filtered.retain(|animal| &animal.name == name);
    }

    filtered
}

#[must_use]
pub fn find_by_id<'a>(id: &str, animals: &'a [Animal]) -> Option<&'a Animal> {
    animals.iter().find(|animal| animal.id == id)
}

/// Check a raw candidate for the fields a record needs, reporting every violation.
#[must_use]
pub fn validate_animal(candidate: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    let object = candidate.as_object();
    let field = |name: &str| object.and_then(|object| object.get(name));

    for name in [FIELD_NAME, FIELD_SPECIES, FIELD_DIET] {
        match field(name) {
            None | Some(Value::Null) => report.push(name, ViolationKind::Missing),
            Some(Value::String(_)) => {}
            Some(_) => report.push(name, ViolationKind::NotAString),
        }
    }

    match field(FIELD_PERSONALITY_TRAITS) {
        None | Some(Value::Null) => report.push(FIELD_PERSONALITY_TRAITS, ViolationKind::Missing),
        Some(Value::Array(traits)) => {
            if !traits.iter().all(Value::is_string) {
                report.push(FIELD_PERSONALITY_TRAITS, ViolationKind::TraitNotAString);
            }
        }
        Some(_) => report.push(FIELD_PERSONALITY_TRAITS, ViolationKind::NotAList),
    }

    report
}

#[must_use]
pub fn is_valid_animal(candidate: &Value) -> bool {
    validate_animal(candidate).is_valid()
}

/// Validate `candidate` and extract a typed record from it.
///
/// Fields other than the four record fields are dropped, including any `id`.
///
/// # Errors
/// Returns `CatalogError::Validation` carrying every violated field.
pub fn parse_new_animal(candidate: &Value) -> Result<NewAnimal, CatalogError> {
    let report = validate_animal(candidate);
    if !report.is_valid() {
        return Err(CatalogError::Validation(report));
    }

    let text = |name: &str| {
        candidate.get(name).and_then(Value::as_str).map(str::to_string).unwrap_or_default()
    };
    let personality_traits = candidate
        .get(FIELD_PERSONALITY_TRAITS)
        .and_then(Value::as_array)
        .map(|traits| traits.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    Ok(NewAnimal {
        name: text(FIELD_NAME),
        species: text(FIELD_SPECIES),
        diet: text(FIELD_DIET),
        personality_traits,
    })
}

/// Identifier for the next record: the current record count as a decimal string.
#[must_use]
pub fn next_animal_id(animals: &[Animal]) -> String {
    animals.len().to_string()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    const TRAIT_POOL: [&str; 5] = ["loyal", "playful", "aloof", "curious", "lazy"];
    const DIET_POOL: [&str; 3] = ["omnivore", "carnivore", "herbivore"];
    const SPECIES_POOL: [&str; 3] = ["dog", "cat", "bear"];

    fn mk_animal(id: &str, name: &str, species: &str, diet: &str, traits: &[&str]) -> Animal {
        Animal {
            id: id.to_string(),
            name: name.to_string(),
            species: species.to_string(),
            diet: diet.to_string(),
            personality_traits: traits.iter().map(|value| (*value).to_string()).collect(),
        }
    }

    fn fixture_catalog() -> Vec<Animal> {
        vec![
            mk_animal("0", "Rex", "dog", "omnivore", &["loyal", "playful"]),
            mk_animal("1", "Milo", "cat", "carnivore", &["aloof"]),
            mk_animal("2", "Bruno", "bear", "omnivore", &["lazy", "loyal"]),
            mk_animal("3", "Nala", "cat", "carnivore", &["playful", "curious", "loyal"]),
        ]
    }

    fn ids(animals: &[Animal]) -> Vec<&str> {
        animals.iter().map(|animal| animal.id.as_str()).collect()
    }

    fn arb_animals() -> impl Strategy<Value = Vec<Animal>> {
        prop::collection::vec(
            (
                prop::sample::select(SPECIES_POOL.to_vec()),
                prop::sample::select(DIET_POOL.to_vec()),
                prop::sample::subsequence(TRAIT_POOL.to_vec(), 0..=TRAIT_POOL.len()),
            ),
            0..12,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(index, (species, diet, traits))| {
                    let name = format!("animal-{index}");
                    mk_animal(&index.to_string(), &name, species, diet, &traits)
                })
                .collect()
        })
    }

    // Test IDs: TFLT-001
    #[test]
    fn empty_query_returns_all_records_in_order() {
        let catalog = fixture_catalog();
        let filtered = filter_by_query(&AnimalQuery::default(), &catalog);
        assert_eq!(filtered, catalog);
    }

    // Test IDs: TFLT-002
    #[test]
    fn traits_are_and_reduced() {
        let catalog = fixture_catalog();
        let query = AnimalQuery {
            personality_traits: vec!["loyal".to_string(), "playful".to_string()],
            ..AnimalQuery::default()
        };
        assert_eq!(ids(&filter_by_query(&query, &catalog)), vec!["0", "3"]);
    }

    // Test IDs: TFLT-003
    #[test]
    fn scalar_criteria_match_exactly_and_case_sensitively() {
        let catalog = fixture_catalog();

        let query = AnimalQuery { diet: Some("carnivore".to_string()), ..AnimalQuery::default() };
        assert_eq!(ids(&filter_by_query(&query, &catalog)), vec!["1", "3"]);

        let query = AnimalQuery { species: Some("Cat".to_string()), ..AnimalQuery::default() };
        assert!(filter_by_query(&query, &catalog).is_empty());

        let query = AnimalQuery { name: Some("Re".to_string()), ..AnimalQuery::default() };
        assert!(filter_by_query(&query, &catalog).is_empty());
    }

    // Test IDs: TFLT-004
    #[test]
    fn traits_and_diet_combine() {
        let catalog = fixture_catalog();
        let query = AnimalQuery::from_pairs([("personalityTraits", "loyal"), ("diet", "omnivore")]);
        assert_eq!(ids(&filter_by_query(&query, &catalog)), vec!["0", "2"]);
    }

    // Test IDs: TFLT-005
    #[test]
    fn query_from_pairs_handles_repeats_brackets_and_unknown_keys() {
        let query = AnimalQuery::from_pairs([
            ("personalityTraits", "loyal"),
            ("personalityTraits[]", "curious"),
            ("species", "dog"),
            ("species", "cat"),
            ("colour", "brown"),
            ("diet", ""),
        ]);
        assert_eq!(query.personality_traits, vec!["loyal".to_string(), "curious".to_string()]);
        assert_eq!(query.species.as_deref(), Some("cat"));
        assert_eq!(query.diet, None);
        assert_eq!(query.name, None);
        assert!(!query.unsatisfiable);
        assert!(AnimalQuery::from_pairs([("unknown", "x")]).is_empty());
    }

    // Test IDs: TFLT-007
    #[test]
    fn list_form_scalar_keys_match_nothing() {
        let catalog = fixture_catalog();

        let query = AnimalQuery::from_pairs([("diet[]", "omnivore")]);
        assert_eq!(query.diet, None);
        assert!(query.unsatisfiable);
        assert!(!query.is_empty());
        assert!(filter_by_query(&query, &catalog).is_empty());

        let query = AnimalQuery::from_pairs([("name[][]", "Rex")]);
        assert_eq!(query.name, None);
        assert!(filter_by_query(&query, &catalog).is_empty());

        let query = AnimalQuery::from_pairs([("personalityTraits[][]", "loyal")]);
        assert!(query.personality_traits.is_empty());
        assert_eq!(filter_by_query(&query, &catalog), catalog);
    }

    // Test IDs: TLKP-001
    #[test]
    fn find_by_id_returns_exact_record_or_none() {
        let catalog = fixture_catalog();
        assert_eq!(find_by_id("2", &catalog).map(|animal| animal.name.as_str()), Some("Bruno"));
        assert!(find_by_id("42", &catalog).is_none());
        assert!(find_by_id("", &catalog).is_none());
    }

    // Test IDs: TVAL-001
    #[test]
    fn validate_accepts_well_formed_candidate() {
        let candidate = json!({
            "name": "Milo",
            "species": "cat",
            "diet": "carnivore",
            "personalityTraits": ["aloof"]
        });
        assert!(is_valid_animal(&candidate));

        let empty_strings = json!({
            "name": "",
            "species": "",
            "diet": "",
            "personalityTraits": []
        });
        assert!(is_valid_animal(&empty_strings));
    }

    // Test IDs: TVAL-002
    #[test]
    fn validate_reports_every_violated_field() {
        let candidate = json!({
            "species": 7,
            "diet": "carnivore",
            "personalityTraits": "aloof"
        });
        let report = validate_animal(&candidate);
        assert!(!report.is_valid());
        assert_eq!(
            report.violated_fields(),
            vec![FIELD_NAME, FIELD_SPECIES, FIELD_PERSONALITY_TRAITS]
        );
        assert_eq!(report.violations[0].problem, ViolationKind::Missing);
        assert_eq!(report.violations[1].problem, ViolationKind::NotAString);
        assert_eq!(report.violations[2].problem, ViolationKind::NotAList);
        assert_eq!(
            report.to_string(),
            "name missing, species not a string, personalityTraits not a list"
        );
    }

    // Test IDs: TVAL-003
    #[test]
    fn validate_rejects_non_object_and_non_string_traits() {
        let report = validate_animal(&json!(["Milo"]));
        assert_eq!(report.violations.len(), 4);
        assert!(report
            .violations
            .iter()
            .all(|violation| violation.problem == ViolationKind::Missing));

        let candidate = json!({
            "name": "Milo",
            "species": "cat",
            "diet": "carnivore",
            "personalityTraits": ["aloof", 3]
        });
        let report = validate_animal(&candidate);
        assert_eq!(report.violated_fields(), vec![FIELD_PERSONALITY_TRAITS]);
        assert_eq!(report.violations[0].problem, ViolationKind::TraitNotAString);
    }

    // Test IDs: TVAL-004
    #[test]
    fn parse_new_animal_drops_extra_fields_and_client_id() {
        let candidate = json!({
            "id": "99",
            "name": "Milo",
            "species": "cat",
            "diet": "carnivore",
            "personalityTraits": ["aloof", "curious"],
            "colour": "grey"
        });
        let parsed = match parse_new_animal(&candidate) {
            Ok(parsed) => parsed,
            Err(err) => panic!("candidate should parse: {err}"),
        };
        let animal = parsed.into_animal("1".to_string());
        assert_eq!(animal, mk_animal("1", "Milo", "cat", "carnivore", &["aloof", "curious"]));

        match parse_new_animal(&json!({ "name": "Milo" })) {
            Err(CatalogError::Validation(report)) => {
                assert_eq!(
                    report.violated_fields(),
                    vec![FIELD_SPECIES, FIELD_DIET, FIELD_PERSONALITY_TRAITS]
                );
            }
            Ok(parsed) => panic!("incomplete candidate should be rejected: {parsed:?}"),
        }
    }

    // Test IDs: TCRT-001
    #[test]
    fn next_id_is_pre_insertion_count() {
        assert_eq!(next_animal_id(&[]), "0");
        assert_eq!(next_animal_id(&fixture_catalog()), "4");
    }

    // Test IDs: TCRT-002
    #[test]
    fn animal_serializes_with_camel_case_traits() {
        let animal = mk_animal("0", "Rex", "dog", "omnivore", &["loyal"]);
        let value = match serde_json::to_value(animal) {
            Ok(value) => value,
            Err(err) => panic!("animal should serialize: {err}"),
        };
        assert_eq!(
            value,
            json!({
                "id": "0",
                "name": "Rex",
                "species": "dog",
                "diet": "omnivore",
                "personalityTraits": ["loyal"]
            })
        );
    }

    // Test IDs: TFLT-006
    proptest! {
        #[test]
        fn property_trait_filter_keeps_exact_supersets(
            animals in arb_animals(),
            wanted in prop::sample::subsequence(TRAIT_POOL.to_vec(), 0..=3),
        ) {
            let query = AnimalQuery {
                personality_traits: wanted.iter().map(|value| (*value).to_string()).collect(),
                ..AnimalQuery::default()
            };
            let expected = animals
                .iter()
                .filter(|animal| wanted.iter().all(|value| animal.has_trait(value)))
                .cloned()
                .collect::<Vec<_>>();
            prop_assert_eq!(filter_by_query(&query, &animals), expected);
        }

        #[test]
        fn property_scalar_filter_is_exact_subset_and_order_preserving(
            animals in arb_animals(),
            diet in prop::option::of(prop::sample::select(DIET_POOL.to_vec())),
            species in prop::option::of(prop::sample::select(SPECIES_POOL.to_vec())),
        ) {
            let query = AnimalQuery {
                diet: diet.map(str::to_string),
                species: species.map(str::to_string),
                ..AnimalQuery::default()
            };
            let expected = animals
                .iter()
                .filter(|animal| diet.iter().all(|value| animal.diet == *value))
                .filter(|animal| species.iter().all(|value| animal.species == *value))
                .cloned()
                .collect::<Vec<_>>();
            let before = animals.clone();
            prop_assert_eq!(filter_by_query(&query, &animals), expected);
            prop_assert_eq!(animals, before);
        }
    }
}
