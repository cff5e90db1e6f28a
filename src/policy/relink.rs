//! Relink actions.
//!
//! A [`RelinkAction`] decides how a group of imported objects maps onto the
//! destination store: create new records, link to existing ones, or discard.
//! Actions are immutable values compared structurally, so the import engine
//! can batch every object that received an equal action.
//!
//! Records an action cannot place are handed to its fallback, which may in
//! turn have a fallback of its own:
//!
//! ```rust
//! use haul::policy::RelinkAction;
//!
//! let action = RelinkAction::link_by_fields(["isbn"])?
//!     .with_fallback(RelinkAction::log_to_console().with_fallback(RelinkAction::discard()));
//! assert!(action.fallback.is_some());
//! # Ok::<(), haul::Error>(())
//! ```

use super::{ImportPolicy, ManyToManyMode};
use crate::models::{FieldMap, FieldValue, Instance, PrimaryKey, Record};
use crate::storage::{RecordStore, Relation};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a relink action for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relinked {
    /// The record maps to this instance.
    Linked(Instance),
    /// The record is discarded.
    Discard,
    /// The action could not place the record; its fallback decides.
    Unresolved,
}

/// Which fields of a linked instance are overwritten from imported data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Overwrite {
    /// Leave the linked instance untouched.
    #[default]
    None,
    /// Overwrite the named fields.
    Fields(Vec<String>),
    /// Overwrite every imported field except the primary key.
    All,
}

impl Overwrite {
    /// Overwrites the named fields.
    #[must_use]
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(Into::into).collect())
    }
}

/// Store access handed to executing actions.
pub struct RelinkContext<'a> {
    /// Destination store.
    pub store: &'a mut dyn RecordStore,
    /// Policy consulted for collection merge modes.
    pub policy: &'a dyn ImportPolicy,
}

impl RelinkContext<'_> {
    /// Assigns typed fields onto an instance and saves it.
    ///
    /// Collection fields go through the policy's [`ManyToManyMode`]; reverse
    /// fields and the primary key are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is unknown or still unresolved, or the
    /// store rejects the assignment.
    pub fn assign_fields<'f>(
        &mut self,
        instance: &Instance,
        fields: impl IntoIterator<Item = (&'f String, &'f FieldValue)>,
    ) -> Result<()> {
        for (name, value) in fields {
            let schema = self.store.require_schema(&instance.kind)?;
            if *name == schema.primary_key {
                continue;
            }
            let relation = schema.require_field(name)?.relation.clone();
            match relation {
                Relation::ReverseToMany { .. } => {},
                Relation::ToMany { .. } => self.assign_collection(instance, name, value)?,
                Relation::None | Relation::ToOne { .. } => {
                    self.store.set_field(instance, name, value.clone())?;
                },
            }
        }
        self.store.save(instance)
    }

    fn assign_collection(&mut self, instance: &Instance, field: &str, value: &FieldValue) -> Result<()> {
        let FieldValue::Instances(targets) = value else {
            return Err(Error::Consistency(format!(
                "{instance}.{field} is not a resolved collection: {value:?}"
            )));
        };
        match self.policy.many_to_many_mode(instance, field) {
            ManyToManyMode::Replace => self.store.replace_related(instance, field, targets.clone()),
            ManyToManyMode::Append => self.store.append_related(instance, field, targets.clone()),
        }
    }
}

/// A caller-defined relink strategy.
///
/// Strategies are compared by [`RelinkStrategy::name`], so two strategies
/// with equal names are batched together.
pub trait RelinkStrategy: Send + Sync {
    /// Stable name identifying the strategy and its configuration.
    fn name(&self) -> &str;

    /// Places a group of records of one kind. Must return one outcome per
    /// record, in order.
    ///
    /// # Errors
    ///
    /// An error aborts the import.
    fn execute(
        &self,
        ctx: &mut RelinkContext<'_>,
        kind: &str,
        records: &[&Record],
    ) -> Result<Vec<Relinked>>;
}

/// Shared handle to a [`RelinkStrategy`], compared by name.
#[derive(Clone)]
pub struct CustomAction(pub Arc<dyn RelinkStrategy>);

impl PartialEq for CustomAction {
    fn eq(&self, other: &Self) -> bool {
        self.0.name() == other.0.name()
    }
}

impl Eq for CustomAction {}

impl Hash for CustomAction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name().hash(state);
    }
}

impl fmt::Debug for CustomAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomAction").field(&self.0.name()).finish()
    }
}

/// What a relink action does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Creates a new record per object, skipping `ignore_fields`.
    Create {
        /// Fields left out of created records.
        ignore_fields: Vec<String>,
    },
    /// Discards every object.
    Discard,
    /// Links to the first existing record with equal `lookup_fields`.
    LinkByFields {
        /// Fields compared for equality. Never empty.
        lookup_fields: Vec<String>,
        /// Fields copied onto the linked record.
        overwrite: Overwrite,
    },
    /// Links to the existing record with the exported primary key.
    LinkByPk {
        /// Fields copied onto the linked record.
        overwrite: Overwrite,
    },
    /// Links every object to one fixed record.
    LinkToInstance {
        /// Primary key of the record in the destination store.
        pk: PrimaryKey,
        /// Fields copied onto the linked record.
        overwrite: Overwrite,
    },
    /// Logs each object and leaves it unresolved.
    LogToConsole,
    /// Caller-defined strategy.
    Custom(CustomAction),
}

/// A relink action with an optional fallback for unresolved records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelinkAction {
    /// What the action does.
    pub kind: ActionKind,
    /// Action applied to records this one leaves unresolved.
    pub fallback: Option<Box<RelinkAction>>,
}

impl RelinkAction {
    const fn of(kind: ActionKind) -> Self {
        Self {
            kind,
            fallback: None,
        }
    }

    /// Creates every record.
    #[must_use]
    pub const fn create() -> Self {
        Self::of(ActionKind::Create {
            ignore_fields: Vec::new(),
        })
    }

    /// Creates every record, leaving out the given fields.
    #[must_use]
    pub fn create_ignoring<I, S>(ignore_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(ActionKind::Create {
            ignore_fields: ignore_fields.into_iter().map(Into::into).collect(),
        })
    }

    /// Discards every record.
    #[must_use]
    pub const fn discard() -> Self {
        Self::of(ActionKind::Discard)
    }

    /// Links records by equality on `lookup_fields`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no lookup field is given.
    pub fn link_by_fields<I, S>(lookup_fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lookup_fields: Vec<String> = lookup_fields.into_iter().map(Into::into).collect();
        if lookup_fields.is_empty() {
            return Err(Error::InvalidInput(
                "link by fields needs at least one lookup field".to_string(),
            ));
        }
        Ok(Self::of(ActionKind::LinkByFields {
            lookup_fields,
            overwrite: Overwrite::None,
        }))
    }

    /// Links records by their exported primary key.
    #[must_use]
    pub const fn link_by_pk() -> Self {
        Self::of(ActionKind::LinkByPk {
            overwrite: Overwrite::None,
        })
    }

    /// Links every record to the existing record with primary key `pk`.
    #[must_use]
    pub fn link_to_instance(pk: impl Into<PrimaryKey>) -> Self {
        Self::of(ActionKind::LinkToInstance {
            pk: pk.into(),
            overwrite: Overwrite::None,
        })
    }

    /// Logs every record and leaves it unresolved.
    #[must_use]
    pub const fn log_to_console() -> Self {
        Self::of(ActionKind::LogToConsole)
    }

    /// Runs a caller-defined strategy.
    #[must_use]
    pub fn custom(strategy: impl RelinkStrategy + 'static) -> Self {
        Self::of(ActionKind::Custom(CustomAction(Arc::new(strategy))))
    }

    /// Sets the overwrite selection of a linking action. Other actions are
    /// returned unchanged.
    #[must_use]
    pub fn with_overwrite(mut self, selection: Overwrite) -> Self {
        match &mut self.kind {
            ActionKind::LinkByFields { overwrite, .. }
            | ActionKind::LinkByPk { overwrite }
            | ActionKind::LinkToInstance { overwrite, .. } => *overwrite = selection,
            _ => {},
        }
        self
    }

    /// Sets the fallback action.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Self) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Executes the action, and its fallback chain, for records of one kind.
    ///
    /// Returns one outcome per record, in order; no outcome is
    /// [`Relinked::Unresolved`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedRelink`] if records remain unresolved with
    /// no fallback left, or any store error.
    pub fn execute(
        &self,
        ctx: &mut RelinkContext<'_>,
        kind: &str,
        records: &[&Record],
    ) -> Result<Vec<Relinked>> {
        let mut outcomes = self.run(ctx, kind, records)?;
        if outcomes.len() != records.len() {
            return Err(Error::Consistency(format!(
                "{self} returned {} outcomes for {} records",
                outcomes.len(),
                records.len()
            )));
        }

        let unresolved: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| **outcome == Relinked::Unresolved)
            .map(|(index, _)| index)
            .collect();
        if unresolved.is_empty() {
            return Ok(outcomes);
        }

        let Some(fallback) = &self.fallback else {
            return Err(Error::UnresolvedRelink {
                action: self.to_string(),
                count: unresolved.len(),
            });
        };
        debug!(action = %self, fallback = %fallback, count = unresolved.len(), "falling back");
        let subset: Vec<&Record> = unresolved.iter().map(|&index| records[index]).collect();
        let fallback_outcomes = fallback.execute(ctx, kind, &subset)?;
        for (index, outcome) in unresolved.into_iter().zip(fallback_outcomes) {
            outcomes[index] = outcome;
        }
        Ok(outcomes)
    }

    fn run(
        &self,
        ctx: &mut RelinkContext<'_>,
        kind: &str,
        records: &[&Record],
    ) -> Result<Vec<Relinked>> {
        match &self.kind {
            ActionKind::Create { ignore_fields } => records
                .iter()
                .map(|record| create(ctx, kind, record, ignore_fields).map(Relinked::Linked))
                .collect(),
            ActionKind::Discard => Ok(vec![Relinked::Discard; records.len()]),
            ActionKind::LinkByFields {
                lookup_fields,
                overwrite,
            } => {
                let outcomes = link_by_fields(ctx, kind, records, lookup_fields)?;
                apply_overwrite(ctx, records, outcomes, overwrite)
            },
            ActionKind::LinkByPk { overwrite } => {
                let pks: Vec<PrimaryKey> = records.iter().map(|r| r.id.pk.clone()).collect();
                let found: HashMap<PrimaryKey, Instance> = ctx
                    .store
                    .fetch(kind, &pks)?
                    .into_iter()
                    .map(|instance| (instance.pk.clone(), instance))
                    .collect();
                let outcomes = records
                    .iter()
                    .map(|record| {
                        found
                            .get(&record.id.pk)
                            .cloned()
                            .map_or(Relinked::Unresolved, Relinked::Linked)
                    })
                    .collect();
                apply_overwrite(ctx, records, outcomes, overwrite)
            },
            ActionKind::LinkToInstance { pk, overwrite } => {
                let instance = ctx
                    .store
                    .fetch(kind, std::slice::from_ref(pk))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::NotFound {
                        kind: kind.to_string(),
                        pk: pk.to_string(),
                    })?;
                let outcomes = vec![Relinked::Linked(instance); records.len()];
                apply_overwrite(ctx, records, outcomes, overwrite)
            },
            ActionKind::LogToConsole => {
                for record in records {
                    info!(object = %record.id, fields = ?record.fields, "relink dry run");
                }
                Ok(vec![Relinked::Unresolved; records.len()])
            },
            ActionKind::Custom(custom) => custom.0.execute(ctx, kind, records),
        }
    }
}

impl fmt::Display for RelinkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Create { ignore_fields } if ignore_fields.is_empty() => write!(f, "Create"),
            ActionKind::Create { ignore_fields } => {
                write!(f, "Create(ignore: {})", ignore_fields.join(", "))
            },
            ActionKind::Discard => write!(f, "Discard"),
            ActionKind::LinkByFields { lookup_fields, .. } => {
                write!(f, "LinkByFields({})", lookup_fields.join(", "))
            },
            ActionKind::LinkByPk { .. } => write!(f, "LinkByPk"),
            ActionKind::LinkToInstance { pk, .. } => write!(f, "LinkToInstance({pk})"),
            ActionKind::LogToConsole => write!(f, "LogToConsole"),
            ActionKind::Custom(custom) => write!(f, "Custom({})", custom.0.name()),
        }
    }
}

fn typed_fields(record: &Record) -> Result<&FieldMap> {
    record
        .fields
        .as_ref()
        .ok_or_else(|| Error::Consistency(format!("{} has not been deserialized", record.id)))
}

fn create(
    ctx: &mut RelinkContext<'_>,
    kind: &str,
    record: &Record,
    ignore_fields: &[String],
) -> Result<Instance> {
    let schema = ctx.store.require_schema(kind)?;
    let mut plain = FieldMap::new();
    let mut collections = Vec::new();
    for (name, value) in typed_fields(record)? {
        if ignore_fields.contains(name) {
            continue;
        }
        match schema.require_field(name)?.relation {
            Relation::ToMany { .. } => collections.push((name, value)),
            Relation::ReverseToMany { .. } => {},
            Relation::None | Relation::ToOne { .. } => {
                plain.insert(name.clone(), value.clone());
            },
        }
    }

    let instance = ctx.store.create(kind, plain)?;
    debug!(object = %record.id, %instance, "created");
    ctx.assign_fields(&instance, collections)?;
    Ok(instance)
}

fn link_by_fields(
    ctx: &RelinkContext<'_>,
    kind: &str,
    records: &[&Record],
    lookup_fields: &[String],
) -> Result<Vec<Relinked>> {
    let mut memo: HashMap<String, Option<Instance>> = HashMap::new();
    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        let fields = typed_fields(record)?;
        let criteria: Vec<(String, FieldValue)> = lookup_fields
            .iter()
            .map(|name| {
                let value = fields
                    .get(name)
                    .cloned()
                    .unwrap_or(FieldValue::Scalar(Value::Null));
                (name.clone(), value)
            })
            .collect();

        let key = lookup_key(&criteria);
        let found = match memo.get(&key) {
            Some(found) => found.clone(),
            None => {
                let found = ctx.store.find_first(kind, &criteria)?;
                memo.insert(key, found.clone());
                found
            },
        };
        outcomes.push(found.map_or(Relinked::Unresolved, Relinked::Linked));
    }
    Ok(outcomes)
}

fn lookup_key(criteria: &[(String, FieldValue)]) -> String {
    let values: Vec<Value> = criteria
        .iter()
        .map(|(_, value)| match value {
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Instance(Some(instance)) => instance.identity().to_value(),
            FieldValue::Instance(None) => Value::Null,
            FieldValue::Instances(instances) => {
                instances.iter().map(|i| i.identity().to_value()).collect()
            },
            FieldValue::Ref(reference) => {
                reference.ids.iter().map(crate::models::Identity::to_value).collect()
            },
        })
        .collect();
    Value::Array(values).to_string()
}

fn apply_overwrite(
    ctx: &mut RelinkContext<'_>,
    records: &[&Record],
    outcomes: Vec<Relinked>,
    overwrite: &Overwrite,
) -> Result<Vec<Relinked>> {
    if *overwrite == Overwrite::None {
        return Ok(outcomes);
    }
    for (record, outcome) in records.iter().zip(&outcomes) {
        let Relinked::Linked(instance) = outcome else {
            continue;
        };
        let fields = typed_fields(record)?;
        match overwrite {
            Overwrite::None => {},
            Overwrite::All => ctx.assign_fields(instance, fields)?,
            Overwrite::Fields(names) => {
                ctx.assign_fields(instance, fields.iter().filter(|(name, _)| names.contains(*name)))?;
            },
        }
        debug!(object = %record.id, %instance, "overwrote linked fields");
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, RawFields};
    use crate::policy::DefaultImportPolicy;
    use crate::storage::{FieldSchema, KindSchema, MemoryStore};
    use std::collections::HashSet;

    fn store() -> MemoryStore {
        MemoryStore::new().with_schema(
            KindSchema::new("library:tag")
                .with_field(FieldSchema::scalar("name"))
                .with_field(FieldSchema::scalar("color").nullable()),
        )
    }

    fn record(pk: i64, name: &str) -> Record {
        let mut record = Record::new(Identity::new("library:tag", pk), RawFields::new());
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), name.into());
        fields.insert("color".to_string(), "red".into());
        record.fields = Some(fields);
        record
    }

    struct Skip;

    impl RelinkStrategy for Skip {
        fn name(&self) -> &str {
            "skip"
        }

        fn execute(
            &self,
            _ctx: &mut RelinkContext<'_>,
            _kind: &str,
            records: &[&Record],
        ) -> Result<Vec<Relinked>> {
            Ok(vec![Relinked::Discard; records.len()])
        }
    }

    #[test]
    fn test_structural_equality() {
        let a = RelinkAction::link_by_fields(["name"])
            .unwrap()
            .with_fallback(RelinkAction::create());
        let b = RelinkAction::link_by_fields(["name"])
            .unwrap()
            .with_fallback(RelinkAction::create());
        assert_eq!(a, b);
        assert_ne!(a, RelinkAction::link_by_fields(["name"]).unwrap());

        let set: HashSet<_> = [
            RelinkAction::custom(Skip),
            RelinkAction::custom(Skip),
            RelinkAction::discard(),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_link_by_fields_requires_lookup() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            RelinkAction::link_by_fields(empty),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fallback_splices_positionally() {
        let mut store = store();
        let existing = store
            .insert("library:tag", [("name", "rust".into())])
            .unwrap();
        let policy = DefaultImportPolicy;
        let mut ctx = RelinkContext {
            store: &mut store,
            policy: &policy,
        };

        let (r1, r2, r3) = (record(10, "go"), record(11, "rust"), record(12, "zig"));
        let action = RelinkAction::link_by_fields(["name"])
            .unwrap()
            .with_fallback(RelinkAction::discard());
        let outcomes = action
            .execute(&mut ctx, "library:tag", &[&r1, &r2, &r3])
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                Relinked::Discard,
                Relinked::Linked(existing),
                Relinked::Discard
            ]
        );
    }

    #[test]
    fn test_unresolved_without_fallback_fails() {
        let mut store = store();
        let policy = DefaultImportPolicy;
        let mut ctx = RelinkContext {
            store: &mut store,
            policy: &policy,
        };
        let r = record(1, "go");
        let result = RelinkAction::log_to_console().execute(&mut ctx, "library:tag", &[&r]);
        assert!(matches!(
            result,
            Err(Error::UnresolvedRelink { count: 1, .. })
        ));
    }

    #[test]
    fn test_link_by_pk_with_overwrite() {
        let mut store = store();
        let existing = store
            .insert("library:tag", [("name", "old".into())])
            .unwrap();
        let policy = DefaultImportPolicy;
        let mut ctx = RelinkContext {
            store: &mut store,
            policy: &policy,
        };

        let r = record(1, "new");
        let action = RelinkAction::link_by_pk().with_overwrite(Overwrite::fields(["name"]));
        let outcomes = action.execute(&mut ctx, "library:tag", &[&r]).unwrap();
        assert_eq!(outcomes, vec![Relinked::Linked(existing.clone())]);
        assert_eq!(store.get_field(&existing, "name").unwrap(), "new".into());
        assert_eq!(
            store.get_field(&existing, "color").unwrap(),
            FieldValue::Scalar(Value::Null)
        );
    }

    #[test]
    fn test_link_to_missing_instance() {
        let mut store = store();
        let policy = DefaultImportPolicy;
        let mut ctx = RelinkContext {
            store: &mut store,
            policy: &policy,
        };
        let r = record(1, "x");
        let result = RelinkAction::link_to_instance(5).execute(&mut ctx, "library:tag", &[&r]);
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_create_ignores_fields() {
        let mut store = store();
        let policy = DefaultImportPolicy;
        let mut ctx = RelinkContext {
            store: &mut store,
            policy: &policy,
        };
        let r = record(1, "x");
        let outcomes = RelinkAction::create_ignoring(["color"])
            .execute(&mut ctx, "library:tag", &[&r])
            .unwrap();
        let Relinked::Linked(instance) = &outcomes[0] else {
            panic!("expected a created instance");
        };
        assert_eq!(
            store.get_field(instance, "color").unwrap(),
            FieldValue::Scalar(Value::Null)
        );
    }

    #[test]
    fn test_display() {
        let action = RelinkAction::link_by_fields(["name", "isbn"]).unwrap();
        assert_eq!(action.to_string(), "LinkByFields(name, isbn)");
        assert_eq!(RelinkAction::custom(Skip).to_string(), "Custom(skip)");
    }
}
