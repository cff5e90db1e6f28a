//! Import engine.
//!
//! Turns a closed set of loaded records into live records in a
//! [`RecordStore`]:
//!
//! 1. **Deserialize**: decode raw fields per kind and collect references
//! 2. **Order**: build the dependency graph over non-weak references
//! 3. **Resolve**: substitute live instances for identities, batch by batch
//! 4. **Relink**: let the policy pick an action per record and execute the
//!    actions group by group
//!
//! Discards cascade through non-nullable references; nullable references to
//! discarded records are nulled instead.

mod graph;

pub use graph::{DependencyGraph, NodeId};

use crate::codec::CodecRegistry;
use crate::models::{FieldMap, FieldValue, Identity, Instance, Record};
use crate::policy::{ImportPolicy, RelinkAction, RelinkContext, Relinked};
use crate::storage::{KindSchema, RecordStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, instrument};

/// Discards of up to this many objects are logged by identity.
const DISCARD_LOG_LIMIT: usize = 5;

/// Outcome of an import.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Every loaded record, with typed fields as they were imported.
    pub loaded: Vec<Record>,
    /// Instances created or linked.
    pub imported: BTreeSet<Instance>,
    /// Identities of discarded records.
    pub discarded: BTreeSet<Identity>,
    /// Identity of every materialized record mapped to its instance.
    pub instance_map: HashMap<Identity, Instance>,
}

impl ImportReport {
    /// Iterates the discarded records.
    pub fn discarded_records(&self) -> impl Iterator<Item = &Record> {
        self.loaded
            .iter()
            .filter(|record| self.discarded.contains(&record.id))
    }

    /// Returns the instance a record was materialized as.
    #[must_use]
    pub fn instance_for(&self, id: &Identity) -> Option<&Instance> {
        self.instance_map.get(id)
    }

    /// Returns the loaded record with an identity.
    #[must_use]
    pub fn record(&self, id: &Identity) -> Option<&Record> {
        self.loaded.iter().find(|record| record.id == *id)
    }
}

enum Resolution {
    Resolved(Vec<(String, FieldValue)>),
    Broken { field: String },
}

/// Runs one import over a set of records.
///
/// The engine holds all per-import state: the identity map, the discard set
/// and the ordering graph. It is consumed by [`ImportEngine::run`].
pub struct ImportEngine<'a> {
    codecs: &'a CodecRegistry,
    store: &'a mut dyn RecordStore,
    policy: &'a mut dyn ImportPolicy,
    ignore_unknown: bool,
    records: Vec<Record>,
    index: HashMap<Identity, usize>,
    instance_map: HashMap<Identity, Instance>,
    discarded: BTreeSet<Identity>,
    imported: BTreeSet<Instance>,
}

impl<'a> ImportEngine<'a> {
    /// Creates an engine writing into `store`.
    #[must_use]
    pub fn new(
        codecs: &'a CodecRegistry,
        store: &'a mut dyn RecordStore,
        policy: &'a mut dyn ImportPolicy,
    ) -> Self {
        Self {
            codecs,
            store,
            policy,
            ignore_unknown: false,
            records: Vec::new(),
            index: HashMap::new(),
            instance_map: HashMap::new(),
            discarded: BTreeSet::new(),
            imported: BTreeSet::new(),
        }
    }

    /// Discards records of kinds without a codec instead of failing.
    #[must_use]
    pub const fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = ignore_unknown;
        self
    }

    /// Imports the records.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate identities, unregistered kinds,
    /// rejected data, references leaving the record set, reference cycles,
    /// relink misses without fallback, or store and policy failures.
    #[instrument(skip_all, fields(objects = records.len()))]
    pub fn run(mut self, records: Vec<Record>) -> Result<ImportReport> {
        for (position, record) in records.iter().enumerate() {
            if self.index.insert(record.id.clone(), position).is_some() {
                return Err(Error::DuplicateObject(record.id.clone()));
            }
        }
        self.records = records;

        self.deserialize()?;
        self.check_closure()?;
        let (mut graph, nodes) = self.build_graph()?;

        while graph.is_active() {
            let ready = graph.take_ready();
            if ready.is_empty() {
                return Err(Error::Consistency(
                    "could not untangle the reference graph".to_string(),
                ));
            }
            let mut by_kind: BTreeMap<String, Vec<(NodeId, usize)>> = BTreeMap::new();
            for node in ready {
                let position = nodes[node.index()];
                by_kind
                    .entry(self.records[position].id.kind.clone())
                    .or_default()
                    .push((node, position));
            }
            for (kind, members) in by_kind {
                self.process_batch(&kind, members, &mut graph)?;
            }
        }

        info!(
            imported = self.instance_map.len(),
            discarded = self.discarded.len(),
            "import finished"
        );
        Ok(ImportReport {
            loaded: self.records,
            imported: self.imported,
            discarded: self.discarded,
            instance_map: self.instance_map,
        })
    }

    fn deserialize(&mut self) -> Result<()> {
        let mut by_kind: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (position, record) in self.records.iter().enumerate() {
            by_kind
                .entry(record.id.kind.clone())
                .or_default()
                .push(position);
        }

        let codecs = self.codecs;
        for (kind, positions) in by_kind {
            let Some(codec) = codecs.get(&kind) else {
                if self.ignore_unknown {
                    self.discard(&positions, "due to unknown kind");
                    continue;
                }
                return Err(Error::KindNotRegistered(kind));
            };

            let raw: Vec<_> = positions.iter().map(|&p| &self.records[p].raw).collect();
            let decoded = codec.decode(&raw).map_err(|e| match e {
                Error::Deserialization { .. } => e,
                other => Error::Deserialization {
                    kind: kind.clone(),
                    cause: other.to_string(),
                },
            })?;
            if decoded.len() != positions.len() {
                return Err(Error::Deserialization {
                    kind,
                    cause: format!(
                        "codec returned {} results for {} objects",
                        decoded.len(),
                        positions.len()
                    ),
                });
            }
            debug!(kind = %kind, count = positions.len(), "deserialized");

            for (position, fields) in positions.into_iter().zip(decoded) {
                let record = &mut self.records[position];
                let references: Vec<_> = fields
                    .values()
                    .filter_map(|value| match value {
                        FieldValue::Ref(reference) => Some(reference.clone()),
                        _ => None,
                    })
                    .collect();
                for reference in references {
                    if !reference.ids.is_empty() {
                        debug!(object = %record.id, field = %reference.field, targets = reference.ids.len(), "found reference");
                    }
                    record.add_reference(reference);
                }
                record.fields = Some(fields);
            }
        }
        Ok(())
    }

    fn check_closure(&self) -> Result<()> {
        for record in &self.records {
            for reference in &record.references {
                if let Some(target) = reference.ids.iter().find(|id| !self.index.contains_key(id)) {
                    return Err(Error::UnresolvedReference {
                        target: target.clone(),
                        source_id: record.id.clone(),
                        field: reference.field.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Builds the ordering graph. Returns it with the record position of
    /// every node.
    fn build_graph(&self) -> Result<(DependencyGraph, Vec<usize>)> {
        let mut graph = DependencyGraph::new();
        let mut node_of = vec![None; self.records.len()];
        let mut nodes = Vec::new();
        for (position, record) in self.records.iter().enumerate() {
            if !self.discarded.contains(&record.id) {
                node_of[position] = Some(graph.add_node());
                nodes.push(position);
            }
        }

        for (position, record) in self.records.iter().enumerate() {
            let Some(node) = node_of[position] else {
                continue;
            };
            for reference in record.references.iter().filter(|r| !r.weak) {
                for id in &reference.ids {
                    if let Some(dependency) = self.index.get(id).and_then(|&p| node_of[p]) {
                        graph.add_dependency(node, dependency);
                    }
                }
            }
        }

        if let Err(cycle) = graph.prepare() {
            let members: Vec<Identity> = cycle
                .iter()
                .map(|node| self.records[nodes[node.index()]].id.clone())
                .collect();
            error!("reference cycle detected");
            for member in &members {
                error!(object = %member, " - cycle member");
            }
            return Err(Error::CycleDetected { members });
        }
        Ok((graph, nodes))
    }

    fn process_batch(
        &mut self,
        kind: &str,
        members: Vec<(NodeId, usize)>,
        graph: &mut DependencyGraph,
    ) -> Result<()> {
        let schema = self.store.require_schema(kind)?.clone();

        let mut survivors = Vec::with_capacity(members.len());
        for (node, position) in members {
            match self.resolve(position, &schema)? {
                Resolution::Broken { field } => {
                    self.discard(&[position], &format!("due to a broken reference via {field}"));
                    graph.mark_done(node);
                },
                Resolution::Resolved(values) => {
                    let record = &mut self.records[position];
                    let fields = record.fields.get_or_insert_with(FieldMap::new);
                    for (name, value) in values {
                        fields.insert(name, value);
                    }
                    for reference in record.references.iter().filter(|r| r.weak) {
                        fields.remove(&reference.field);
                    }
                    for name in schema.reverse_fields() {
                        fields.remove(name);
                    }
                    survivors.push((node, position));
                },
            }
        }

        for &(_, position) in &survivors {
            let fields = self.records[position]
                .fields
                .get_or_insert_with(FieldMap::new);
            self.policy.preprocess_fields(kind, fields)?;
        }

        let mut groups: Vec<(RelinkAction, Vec<(NodeId, usize)>)> = Vec::new();
        let mut group_of: HashMap<RelinkAction, usize> = HashMap::new();
        for (node, position) in survivors {
            let action = self.policy.relink(kind, &self.records[position]);
            if let Some(&group) = group_of.get(&action) {
                groups[group].1.push((node, position));
            } else {
                group_of.insert(action.clone(), groups.len());
                groups.push((action, vec![(node, position)]));
            }
        }

        for (action, members) in groups {
            self.execute_group(kind, &action, &members, graph)?;
        }
        Ok(())
    }

    fn resolve(&self, position: usize, schema: &KindSchema) -> Result<Resolution> {
        let record = &self.records[position];
        let mut values = Vec::new();
        for reference in record.references.iter().filter(|r| !r.weak) {
            let mut remaining = Vec::with_capacity(reference.ids.len());
            for id in &reference.ids {
                if let Some(instance) = self.instance_map.get(id) {
                    remaining.push(instance.clone());
                } else if self.discarded.contains(id) {
                    if !reference.nullable {
                        return Ok(Resolution::Broken {
                            field: reference.field.clone(),
                        });
                    }
                    debug!(object = %record.id, field = %reference.field, target = %id, "breaking reference to discarded object");
                } else {
                    return Err(Error::Consistency(format!(
                        "{id} is neither imported nor discarded (referenced by {} via {})",
                        record.id, reference.field
                    )));
                }
            }

            let collection = schema
                .field(&reference.field)
                .is_some_and(|f| f.relation.is_collection());
            let value = if collection {
                FieldValue::Instances(remaining)
            } else {
                FieldValue::Instance(remaining.into_iter().next())
            };
            values.push((reference.field.clone(), value));
        }
        Ok(Resolution::Resolved(values))
    }

    fn execute_group(
        &mut self,
        kind: &str,
        action: &RelinkAction,
        members: &[(NodeId, usize)],
        graph: &mut DependencyGraph,
    ) -> Result<()> {
        for &(_, position) in members {
            let fields = self.records[position]
                .fields
                .get_or_insert_with(FieldMap::new);
            self.policy.postprocess_fields(kind, fields)?;
        }

        debug!(action = %action, kind, count = members.len(), "running relink action");
        let outcomes = {
            let records: Vec<&Record> = members.iter().map(|&(_, p)| &self.records[p]).collect();
            let mut ctx = RelinkContext {
                store: &mut *self.store,
                policy: &*self.policy,
            };
            action.execute(&mut ctx, kind, &records)?
        };

        for (&(node, position), outcome) in members.iter().zip(outcomes) {
            match outcome {
                Relinked::Linked(instance) => {
                    self.policy.post_import(&instance)?;
                    let id = self.records[position].id.clone();
                    debug!(object = %id, %instance, "imported");
                    self.imported.insert(instance.clone());
                    self.instance_map.insert(id, instance);
                },
                Relinked::Discard => self.discard(&[position], "due to relink policy"),
                Relinked::Unresolved => {
                    return Err(Error::Consistency(format!(
                        "{action} left {} unresolved",
                        self.records[position].id
                    )));
                },
            }
            graph.mark_done(node);
        }
        Ok(())
    }

    fn discard(&mut self, positions: &[usize], reason: &str) {
        let mut by_kind: BTreeMap<&str, Vec<&Identity>> = BTreeMap::new();
        for &position in positions {
            let id = &self.records[position].id;
            by_kind.entry(id.kind.as_str()).or_default().push(id);
        }
        for (kind, ids) in &by_kind {
            if ids.len() <= DISCARD_LOG_LIMIT {
                let description = ids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                debug!("discarding {description} {reason}");
            } else {
                debug!("discarding {} {kind} objects {reason}", ids.len());
            }
        }
        let ids: Vec<Identity> = by_kind.into_values().flatten().cloned().collect();
        self.discarded.extend(ids);
    }
}
