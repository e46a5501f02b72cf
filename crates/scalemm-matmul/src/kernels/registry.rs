use core::fmt::Display;

use hashbrown::HashMap;
use scalemm_runtime::ComputeClient;
use scalemm_runtime::properties::HardwareGeneration;

use crate::BatchedScaledMatmul;
use crate::components::tiling::TileDescriptor;
use crate::components::{
    FormattedConfigError, MatmulElems, MatmulProblem, MatmulSetupError, ShapeClass,
};

/// Key of a list of candidate descriptors.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RegistryKey {
    pub generation: HardwareGeneration,
    pub elems: MatmulElems,
    pub shape_class: ShapeClass,
}

impl Display for RegistryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} [{}] {:?}",
            self.generation, self.elems, self.shape_class
        )
    }
}

/// A descriptor registered under a key, as written in a registry file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RegistryEntry {
    pub generation: HardwareGeneration,
    pub shape_class: ShapeClass,
    pub elems: MatmulElems,
    pub descriptor: TileDescriptor,
}

impl RegistryEntry {
    pub fn new(key: RegistryKey, descriptor: TileDescriptor) -> Self {
        Self {
            generation: key.generation,
            shape_class: key.shape_class,
            elems: key.elems,
            descriptor,
        }
    }

    pub fn key(&self) -> RegistryKey {
        RegistryKey::new(self.generation, self.elems, self.shape_class)
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct RegistryFile {
    #[serde(default)]
    entry: Vec<RegistryEntry>,
}

/// Candidate tile descriptors per device generation, element types and problem size class.
///
/// Candidates are tried in order and the first one that is valid on the device and supports the
/// problem is selected.
#[derive(Clone, Debug)]
pub struct MatmulRegistry {
    entries: HashMap<RegistryKey, Vec<TileDescriptor>>,
}

impl Default for MatmulRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        for elems in MatmulElems::SUPPORTED {
            for shape_class in [ShapeClass::Small, ShapeClass::Large] {
                let cdna3 = match shape_class {
                    ShapeClass::Large => [TileDescriptor::reference(), TileDescriptor::cdna3_small()],
                    ShapeClass::Small => [TileDescriptor::cdna3_small(), TileDescriptor::reference()],
                };
                let key = |generation| RegistryKey::new(generation, elems, shape_class);

                for descriptor in cdna3 {
                    registry.register(key(HardwareGeneration::Cdna3), descriptor);
                }
                registry.register(key(HardwareGeneration::Rdna4), TileDescriptor::rdna4_wmma());
                registry.register(key(HardwareGeneration::Generic), TileDescriptor::generic_fma());
            }
        }

        registry
    }
}

impl MatmulRegistry {
    /// A registry without any candidate.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Appends a candidate, tried after those already registered under the key.
    pub fn register(&mut self, key: RegistryKey, descriptor: TileDescriptor) {
        self.entries.entry(key).or_default().push(descriptor);
    }

    /// Candidates registered under the key, in selection order.
    pub fn candidates(&self, key: &RegistryKey) -> &[TileDescriptor] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Adds the `[[entry]]` tables of a TOML document, returning how many were read.
    ///
    /// Entries of the document are tried before the candidates already registered under the same
    /// key, in document order.
    pub fn extend_from_toml(&mut self, content: &str) -> Result<usize, toml::de::Error> {
        let file: RegistryFile = toml::from_str(content)?;
        let count = file.entry.len();
        let mut added: HashMap<RegistryKey, Vec<TileDescriptor>> = HashMap::new();

        for entry in file.entry {
            added.entry(entry.key()).or_default().push(entry.descriptor);
        }

        for (key, mut descriptors) in added {
            let existing = self.entries.remove(&key).unwrap_or_default();
            descriptors.extend(existing);
            self.entries.insert(key, descriptors);
        }

        Ok(count)
    }

    /// Serializes every candidate as `[[entry]]` tables.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut keys: Vec<_> = self.entries.keys().copied().collect();
        keys.sort_by_cached_key(|key| key.to_string());

        let entry = keys
            .into_iter()
            .flat_map(|key| {
                self.candidates(&key)
                    .iter()
                    .cloned()
                    .map(move |descriptor| RegistryEntry::new(key, descriptor))
            })
            .collect();

        toml::to_string(&RegistryFile { entry })
    }

    /// Selects the first candidate valid on the device of `client` that supports `problem`.
    pub fn select(
        &self,
        client: &ComputeClient,
        problem: &MatmulProblem,
        elems: MatmulElems,
    ) -> Result<BatchedScaledMatmul, MatmulSetupError> {
        let key = RegistryKey::new(
            client.properties().generation,
            elems,
            problem.shape_class(),
        );
        let mut reasons = Vec::new();

        for descriptor in self.candidates(&key) {
            let matmul = match BatchedScaledMatmul::new(client, descriptor.clone(), elems) {
                Ok(matmul) => matmul,
                Err(err) => {
                    log::debug!("Skipping descriptor {descriptor}: {err}");
                    reasons.push(format!("{descriptor}: {err}"));
                    continue;
                }
            };

            match matmul.check_problem(problem) {
                Ok(()) => {
                    log::debug!("Selected {} for {problem}", matmul.type_string());
                    return Ok(matmul);
                }
                Err(err) => {
                    log::debug!("Skipping descriptor {descriptor}: {err}");
                    reasons.push(format!("{descriptor}: {err}"));
                }
            }
        }

        let problem = *problem;
        Err(MatmulSetupError::InvalidConfig(FormattedConfigError::new(
            move || match reasons.is_empty() {
                true => format!("No descriptor registered for {key}, problem {problem}"),
                false => format!(
                    "No descriptor registered for {key} supports {problem}:\n{}",
                    reasons.join("\n")
                ),
            },
        )))
    }
}
