//! Validate-then-execute driver for element-wise operations.
//!
//! [`run_operation`] moves through two states. *Validating* resolves every
//! input attribute, checks kinds against the operation's declaration,
//! resolves the working kind and checks row counts. Any failure there aborts
//! the whole invocation: it is logged, reported as
//! [`DiagnosticEvent::OperationRejected`] to the first input table's
//! observer, and the output is empty. *Executing* creates the output table
//! as a child of the first input's table, mirrors the first input's entry
//! keys, and lets the operation write its rows through the
//! [`OperationContext`] helpers.

use std::sync::Arc;

use attrstore_core::{
    Attribute, AttributeBase, AttributeTable, DiagnosticEvent, downcast_attribute,
};
use attrstore_error::{AttrError, Result};
use attrstore_types::{EntryKey, MetadataType, ValueKind, can_broadcast, resolve_most_complex};
use tracing::{debug, error, warn};

use crate::config::PipelineConfig;
use crate::iterator::{EntryIterator, IteratorRole, walk_lockstep};
use crate::operation::AttributeOperation;

/// Which entry keys of an input table are walked.
#[derive(Debug, Clone)]
pub enum EntrySource {
    /// Explicit per-entity keys, in row order.
    Entries(Arc<[EntryKey]>),
    /// The attribute's own locally bound keys, ascending.
    AttributeEntries,
}

/// One input pin of a request.
#[derive(Debug, Clone)]
pub struct OperationInput {
    pub table: Arc<AttributeTable>,
    pub attribute: String,
    pub source: EntrySource,
}

impl OperationInput {
    pub fn entries(
        table: &Arc<AttributeTable>,
        attribute: &str,
        keys: impl Into<Arc<[EntryKey]>>,
    ) -> Self {
        Self {
            table: Arc::clone(table),
            attribute: attribute.to_owned(),
            source: EntrySource::Entries(keys.into()),
        }
    }

    pub fn attribute_entries(table: &Arc<AttributeTable>, attribute: &str) -> Self {
        Self {
            table: Arc::clone(table),
            attribute: attribute.to_owned(),
            source: EntrySource::AttributeEntries,
        }
    }

    fn walks_same_keys_as(&self, primary: &Self) -> bool {
        if !Arc::ptr_eq(&self.table, &primary.table) {
            return false;
        }
        match (&self.source, &primary.source) {
            (EntrySource::Entries(a), EntrySource::Entries(b)) => Arc::ptr_eq(a, b) || a == b,
            (EntrySource::AttributeEntries, EntrySource::AttributeEntries) => {
                self.attribute == primary.attribute
            }
            _ => false,
        }
    }
}

/// Wiring of one output pin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputPin {
    /// Connected, named by [`PipelineConfig::output_name`].
    #[default]
    Default,
    Named(String),
    Disconnected,
}

#[derive(Debug, Clone, Default)]
pub struct OperationRequest {
    pub inputs: Vec<OperationInput>,
    /// Pins past the end of this list are [`OutputPin::Default`].
    pub outputs: Vec<OutputPin>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(inputs: Vec<OperationInput>) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_output(mut self, pin: usize, wiring: OutputPin) -> Self {
        if self.outputs.len() <= pin {
            self.outputs.resize(pin + 1, OutputPin::Default);
        }
        self.outputs[pin] = wiring;
        self
    }

    #[must_use]
    pub fn named_output(self, pin: usize, name: &str) -> Self {
        self.with_output(pin, OutputPin::Named(name.to_owned()))
    }
}

/// Result of one invocation. Empty (no table) when the operation was
/// rejected.
#[derive(Debug, Default)]
pub struct OperationOutput {
    pub table: Option<Arc<AttributeTable>>,
    /// Output rows, in the output table's key space.
    pub entry_keys: Vec<EntryKey>,
    /// Output attribute per pin; `None` for pins that were not written.
    pub attributes: Vec<Option<Arc<dyn AttributeBase>>>,
    pub rejection: Option<AttrError>,
}

impl OperationOutput {
    fn rejected(err: AttrError) -> Self {
        Self {
            rejection: Some(err),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_none()
    }

    #[must_use]
    pub fn attribute(&self, pin: usize) -> Option<&Arc<dyn AttributeBase>> {
        self.attributes.get(pin).and_then(Option::as_ref)
    }

    pub fn typed_attribute<T: MetadataType>(&self, pin: usize) -> Option<Arc<Attribute<T>>> {
        self.attribute(pin).and_then(downcast_attribute::<T>)
    }

    /// Output `pin` read back at every output row.
    pub fn values<T: MetadataType>(&self, pin: usize) -> Vec<T> {
        self.typed_attribute::<T>(pin).map_or_else(Vec::new, |attr| {
            self.entry_keys
                .iter()
                .map(|&k| attr.get_value_from_item_key(k))
                .collect()
        })
    }
}

struct ResolvedInput {
    attribute: Arc<dyn AttributeBase>,
    rows: usize,
}

struct Validated {
    inputs: Vec<ResolvedInput>,
    working_kind: ValueKind,
    rows: usize,
    output_names: Vec<Option<String>>,
}

/// Run `operation` over `request`.
///
/// Never fails loudly: a rejected request yields an empty
/// [`OperationOutput`] carrying the rejection cause.
pub fn run_operation(
    operation: &dyn AttributeOperation,
    request: &OperationRequest,
    config: &PipelineConfig,
) -> OperationOutput {
    debug!(operation = operation.name(), state = "validating", "operation pipeline");
    let validated = match validate(operation, request, config) {
        Ok(v) => v,
        Err(err) => return reject(operation, request, err),
    };
    debug!(
        operation = operation.name(),
        state = "executing",
        working_kind = %validated.working_kind,
        rows = validated.rows,
        "operation pipeline"
    );

    let mut cx = OperationContext::plan(operation, request, validated);
    if let Err(err) = operation.execute(&mut cx) {
        return reject(operation, request, err);
    }
    debug!(
        operation = operation.name(),
        rows = cx.output_keys.len(),
        written = cx.outputs.iter().filter(|o| o.is_some()).count(),
        "operation executed"
    );
    OperationOutput {
        table: Some(cx.output_table),
        entry_keys: cx.output_keys,
        attributes: cx.outputs,
        rejection: None,
    }
}

fn reject(
    operation: &dyn AttributeOperation,
    request: &OperationRequest,
    err: AttrError,
) -> OperationOutput {
    error!(operation = operation.name(), %err, "operation rejected");
    if let Some(first) = request.inputs.first() {
        first.table.observer().on_event(&DiagnosticEvent::OperationRejected {
            operation: operation.name().to_owned(),
            reason: err.to_string(),
        });
    }
    OperationOutput::rejected(err)
}

fn validate(
    operation: &dyn AttributeOperation,
    request: &OperationRequest,
    config: &PipelineConfig,
) -> Result<Validated> {
    if request.inputs.len() != operation.num_inputs() || request.inputs.is_empty() {
        return Err(AttrError::InputCount {
            operation: operation.name().to_owned(),
            expected: operation.num_inputs(),
            actual: request.inputs.len(),
        });
    }

    let mut inputs = Vec::with_capacity(request.inputs.len());
    let mut general_kinds = Vec::new();
    for (pin, input) in request.inputs.iter().enumerate() {
        let attribute = input
            .table
            .attribute(&input.attribute)
            .ok_or_else(|| AttrError::not_found(input.attribute.as_str()))?;
        let kind = attribute.kind();
        let support = operation.is_supported_kind(kind, pin);
        if !support.supported {
            return Err(AttrError::UnsupportedKind {
                pin,
                label: operation.input_label(pin).to_owned(),
                kind: kind.to_string(),
            });
        }
        if !support.has_special_requirement {
            general_kinds.push(kind);
        }
        let rows = match &input.source {
            EntrySource::Entries(keys) => keys.len(),
            EntrySource::AttributeEntries => attribute.entry_count(),
        };
        inputs.push(ResolvedInput { attribute, rows });
    }

    let working_kind = match resolve_most_complex(general_kinds) {
        Ok(Some(kind)) => kind,
        Ok(None) => inputs[0].attribute.kind(),
        Err(conflict) => {
            return Err(AttrError::NotBroadcastable {
                from: conflict.incoming.to_string(),
                to: conflict.current.to_string(),
            });
        }
    };

    let rows = inputs[0].rows;
    for (pin, input) in inputs.iter().enumerate().skip(1) {
        let fits = input.rows == rows
            || (input.rows == 1 && config.allow_broadcast)
            || (input.rows == 0 && config.allow_constant_inputs);
        if !fits {
            return Err(AttrError::CardinalityMismatch {
                pin,
                expected: rows,
                actual: input.rows,
            });
        }
    }

    let num_outputs = operation.num_outputs();
    let output_names: Vec<Option<String>> = (0..num_outputs)
        .map(|pin| match request.outputs.get(pin) {
            None | Some(OutputPin::Default) => {
                Some(config.output_name(num_outputs, operation.output_label(pin)))
            }
            Some(OutputPin::Named(name)) => Some(name.clone()),
            Some(OutputPin::Disconnected) => None,
        })
        .collect();
    if output_names.iter().all(Option::is_none) {
        return Err(AttrError::NoOutputConnected {
            operation: operation.name().to_owned(),
        });
    }
    for (pin, name) in output_names.iter().enumerate() {
        let Some(name) = name else { continue };
        if output_names[..pin].iter().flatten().any(|n| n == name) {
            return Err(AttrError::AttributeExists { name: name.clone() });
        }
    }

    Ok(Validated {
        inputs,
        working_kind,
        rows,
        output_names,
    })
}

enum Reader<T: MetadataType> {
    Direct(Arc<Attribute<T>>),
    Broadcast(Arc<dyn AttributeBase>),
}

impl<T: MetadataType> Reader<T> {
    fn read(&self, key: EntryKey) -> Option<T> {
        match self {
            Self::Direct(attr) => Some(attr.get_value_from_item_key(key)),
            Self::Broadcast(attr) => T::from_broadcast(&attr.value_from_item_key(key)),
        }
    }

    fn default_value(&self) -> Option<T> {
        self.read(EntryKey::INVALID)
    }
}

enum Writer<O: MetadataType> {
    Direct(Arc<Attribute<O>>),
    Erased(Arc<dyn AttributeBase>),
}

impl<O: MetadataType> Writer<O> {
    fn new(attr: &Arc<dyn AttributeBase>) -> Self {
        downcast_attribute::<O>(attr).map_or_else(|| Self::Erased(Arc::clone(attr)), Self::Direct)
    }

    fn write(&self, key: EntryKey, value: O) {
        match self {
            Self::Direct(attr) => attr.set_value(key, value),
            Self::Erased(attr) => {
                if !attr.set_value_erased(key, &value.into_value()) {
                    warn!(attribute = %attr.name(), %key, from = %O::KIND, "output row dropped");
                }
            }
        }
    }
}

/// Per-invocation state handed to [`AttributeOperation::execute`].
pub struct OperationContext<'a> {
    operation: &'a dyn AttributeOperation,
    inputs: Vec<ResolvedInput>,
    plan: Vec<(EntryIterator, IteratorRole)>,
    working_kind: ValueKind,
    rows: usize,
    output_table: Arc<AttributeTable>,
    output_keys: Vec<EntryKey>,
    output_names: Vec<Option<String>>,
    outputs: Vec<Option<Arc<dyn AttributeBase>>>,
}

impl<'a> OperationContext<'a> {
    fn plan(
        operation: &'a dyn AttributeOperation,
        request: &OperationRequest,
        validated: Validated,
    ) -> Self {
        let Validated {
            inputs,
            working_kind,
            rows,
            output_names,
        } = validated;
        let primary = &request.inputs[0];

        let plan: Vec<_> = request
            .inputs
            .iter()
            .zip(&inputs)
            .enumerate()
            .map(|(pin, (input, resolved))| {
                if resolved.rows == 0 {
                    return (EntryIterator::Constant, IteratorRole::Repeat);
                }
                let broadcast = pin > 0 && resolved.rows == 1 && rows != 1;
                let iter = match &input.source {
                    EntrySource::Entries(keys) => EntryIterator::over_index(Arc::clone(keys), broadcast),
                    EntrySource::AttributeEntries => {
                        EntryIterator::over_attribute(resolved.attribute.local_entry_keys(), broadcast)
                    }
                };
                let role = if pin == 0 {
                    IteratorRole::Owned
                } else if broadcast {
                    IteratorRole::Repeat
                } else if input.walks_same_keys_as(primary) {
                    IteratorRole::AliasOfPrimary
                } else {
                    IteratorRole::Owned
                };
                (iter, role)
            })
            .collect();

        let output_table = AttributeTable::new_child(&primary.table);
        let output_keys = if operation.reduces() {
            if rows == 0 {
                Vec::new()
            } else {
                vec![output_table.add_entry(EntryKey::INVALID)]
            }
        } else {
            let inherited = output_table.item_key_offset();
            let mut keys = Vec::with_capacity(rows);
            walk_lockstep(&plan[..1], rows, |_, ks| {
                let key = ks[0];
                keys.push(if key.is_valid() && key.get() < inherited {
                    key
                } else {
                    output_table.add_entry(EntryKey::INVALID)
                });
            });
            keys
        };

        let outputs = vec![None; output_names.len()];
        Self {
            operation,
            inputs,
            plan,
            working_kind,
            rows,
            output_table,
            output_keys,
            output_names,
            outputs,
        }
    }

    /// Kind every general (non-special) input is converted to.
    #[must_use]
    pub fn working_kind(&self) -> ValueKind {
        self.working_kind
    }

    /// Row count of input 0.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Kind of the attribute backing input `pin`.
    #[must_use]
    pub fn input_kind(&self, pin: usize) -> Option<ValueKind> {
        self.inputs.get(pin).map(|i| i.attribute.kind())
    }

    #[must_use]
    pub fn output_kind(&self, pin: usize) -> ValueKind {
        self.operation.output_kind(pin, self.working_kind)
    }

    #[must_use]
    pub fn is_output_connected(&self, pin: usize) -> bool {
        self.output_names.get(pin).is_some_and(Option::is_some)
    }

    #[must_use]
    pub fn output_table(&self) -> &Arc<AttributeTable> {
        &self.output_table
    }

    fn reader<T: MetadataType>(&self, pin: usize) -> Result<Reader<T>> {
        let input = self
            .inputs
            .get(pin)
            .ok_or_else(|| AttrError::internal(format!("input pin {pin} out of range")))?;
        let kind = input.attribute.kind();
        if let Some(direct) = downcast_attribute::<T>(&input.attribute) {
            return Ok(Reader::Direct(direct));
        }
        if can_broadcast(kind, T::KIND) {
            return Ok(Reader::Broadcast(Arc::clone(&input.attribute)));
        }
        Err(AttrError::NotBroadcastable {
            from: kind.to_string(),
            to: T::KIND.to_string(),
        })
    }

    /// Create output `pin` on first use. An attribute of the same name
    /// inherited from the input table is replaced.
    ///
    /// An element-wise output of input 0's kind starts as a copy of input 0
    /// at every output row; other outputs start at their default.
    fn output<O: MetadataType>(&mut self, pin: usize, default: O) -> Result<Writer<O>> {
        if let Some(Some(existing)) = self.outputs.get(pin) {
            return Ok(Writer::new(existing));
        }
        let name = self
            .output_names
            .get(pin)
            .cloned()
            .flatten()
            .ok_or_else(|| AttrError::internal(format!("output pin {pin} is not connected")))?;
        let kind = self.output_kind(pin);
        if self.output_table.has_attribute(&name) {
            self.output_table.delete_attribute(&name);
        }
        let attr = self
            .output_table
            .create_attribute_of_kind(
                kind,
                &name,
                &default.into_value(),
                kind.traits().can_interpolate,
                false,
            )
            .ok_or_else(|| AttrError::NotBroadcastable {
                from: O::KIND.to_string(),
                to: kind.to_string(),
            })?;
        debug!(operation = self.operation.name(), pin, attribute = %name, %kind, "output created");
        if !self.operation.reduces() && kind == self.inputs[0].attribute.kind() {
            self.seed_from_primary(&attr);
        }
        let writer = Writer::new(&attr);
        self.outputs[pin] = Some(attr);
        Ok(writer)
    }

    fn seed_from_primary(&self, attr: &Arc<dyn AttributeBase>) {
        let source = &self.inputs[0].attribute;
        let out_keys = &self.output_keys;
        walk_lockstep(&self.plan[..1], self.rows, |r, keys| {
            if let Some(&out) = out_keys.get(r) {
                if keys[0].is_valid() {
                    attr.set_value_from(out, &**source, keys[0]);
                }
            }
        });
    }

    fn write_rows<O: MetadataType>(
        &mut self,
        out_pin: usize,
        default: Option<O>,
        mut row: impl FnMut(&[EntryKey]) -> Option<O>,
    ) -> Result<()> {
        if !self.is_output_connected(out_pin) {
            return Ok(());
        }
        let writer = self.output(out_pin, default.unwrap_or_else(O::zero_value))?;
        let out_keys = &self.output_keys;
        walk_lockstep(&self.plan, self.rows, |r, keys| {
            if let (Some(&out), Some(value)) = (out_keys.get(r), row(keys)) {
                writer.write(out, value);
            }
        });
        Ok(())
    }

    /// Write output `out_pin` from input 0. Rows where `f` returns `None`
    /// keep input 0's value when the output has its kind, the output default
    /// otherwise.
    pub fn apply_unary<A, O>(&mut self, out_pin: usize, f: impl Fn(&A) -> Option<O>) -> Result<()>
    where
        A: MetadataType,
        O: MetadataType,
    {
        let a = self.reader::<A>(0)?;
        let default = a.default_value().and_then(|x| f(&x));
        self.write_rows(out_pin, default, |keys| f(&a.read(keys[0])?))
    }

    /// Write output `out_pin` from inputs 0 and 1.
    pub fn apply_binary<A, B, O>(
        &mut self,
        out_pin: usize,
        f: impl Fn(&A, &B) -> Option<O>,
    ) -> Result<()>
    where
        A: MetadataType,
        B: MetadataType,
        O: MetadataType,
    {
        let a = self.reader::<A>(0)?;
        let b = self.reader::<B>(1)?;
        let default = a
            .default_value()
            .zip(b.default_value())
            .and_then(|(x, y)| f(&x, &y));
        self.write_rows(out_pin, default, |keys| {
            f(&a.read(keys[0])?, &b.read(keys[1])?)
        })
    }

    /// Write output `out_pin` from inputs 0, 1 and 2.
    pub fn apply_ternary<A, B, C, O>(
        &mut self,
        out_pin: usize,
        f: impl Fn(&A, &B, &C) -> Option<O>,
    ) -> Result<()>
    where
        A: MetadataType,
        B: MetadataType,
        C: MetadataType,
        O: MetadataType,
    {
        let a = self.reader::<A>(0)?;
        let b = self.reader::<B>(1)?;
        let c = self.reader::<C>(2)?;
        let default = match (a.default_value(), b.default_value(), c.default_value()) {
            (Some(x), Some(y), Some(z)) => f(&x, &y, &z),
            _ => None,
        };
        self.write_rows(out_pin, default, |keys| {
            f(&a.read(keys[0])?, &b.read(keys[1])?, &c.read(keys[2])?)
        })
    }

    /// Every row of input `pin`, converted to `T`.
    pub fn gather<T: MetadataType>(&self, pin: usize) -> Result<Vec<T>> {
        let reader = self.reader::<T>(pin)?;
        let mut values = Vec::with_capacity(self.rows);
        walk_lockstep(&self.plan, self.rows, |_, keys| {
            if let Some(v) = reader.read(keys[pin]) {
                values.push(v);
            }
        });
        Ok(values)
    }

    /// Default value of input `pin`, converted to `T`.
    pub fn input_default<T: MetadataType>(&self, pin: usize) -> Result<T> {
        self.reader::<T>(pin)?
            .default_value()
            .ok_or_else(|| AttrError::internal(format!("default of input {pin} not readable")))
    }

    /// Write the single row of a reducing operation. `value` is `None` when
    /// there was nothing to reduce; the output then only carries `default`.
    pub fn write_reduced<O: MetadataType>(
        &mut self,
        out_pin: usize,
        default: O,
        value: Option<O>,
    ) -> Result<()> {
        if !self.is_output_connected(out_pin) {
            return Ok(());
        }
        let writer = self.output(out_pin, default)?;
        if let (Some(&key), Some(value)) = (self.output_keys.first(), value) {
            writer.write(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use attrstore_core::DiagnosticLog;
    use attrstore_error::ErrorCategory;
    use attrstore_types::MetadataValue;

    use super::*;
    use crate::operation::KindSupport;

    /// `a + b` over numeric kinds.
    struct Plus;

    impl AttributeOperation for Plus {
        fn name(&self) -> &str {
            "plus"
        }

        fn num_inputs(&self) -> usize {
            2
        }

        fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
            KindSupport::when(kind.is_numeric())
        }

        fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
            match cx.working_kind() {
                ValueKind::Int32 => cx.apply_binary::<i32, i32, i32>(0, |a, b| Some(a + b)),
                _ => cx.apply_binary::<f64, f64, f64>(0, |a, b| Some(a + b)),
            }
        }
    }

    fn logged_root() -> (Arc<AttributeTable>, Arc<DiagnosticLog>) {
        let log = Arc::new(DiagnosticLog::default());
        let table = AttributeTable::new_root_with_observer(Arc::clone(&log) as _);
        (table, log)
    }

    fn with_values(table: &AttributeTable, name: &str, values: &[f64]) -> Vec<EntryKey> {
        let attr = table.create_attribute(name, 0.0_f64, true, false).unwrap();
        values
            .iter()
            .map(|&v| {
                let k = table.add_entry(EntryKey::INVALID);
                attr.set_value(k, v);
                k
            })
            .collect()
    }

    #[test]
    fn binary_over_matching_rows() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0, 3.0]);
        let b = t.create_attribute("b", 0.0_f64, true, false).unwrap();
        for (i, k) in keys.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            b.set_value(*k, 10.0 * i as f64);
        }
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "b", keys),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert!(out.rejection.is_none());
        assert_eq!(out.values::<f64>(0), vec![1.0, 12.0, 23.0]);
        let table = out.table.unwrap();
        assert_eq!(table.parent_id(), Some(t.id()));
    }

    #[test]
    fn alias_input_is_not_double_advanced() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0, 2.0]);
        let keys: Arc<[EntryKey]> = keys.into();
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", Arc::clone(&keys)),
            OperationInput::entries(&t, "a", keys),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![2.0, 4.0, 4.0]);
    }

    #[test]
    fn single_row_broadcasts() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0, 3.0, 4.0]);
        let scale = t.create_attribute("s", 0_i32, true, false).unwrap();
        let sk = t.add_entry(EntryKey::INVALID);
        scale.set_value(sk, 100);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys),
            OperationInput::entries(&t, "s", vec![sk]),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![101.0, 102.0, 103.0, 104.0]);
        assert_eq!(out.attribute(0).unwrap().kind(), ValueKind::Double);
    }

    #[test]
    fn broadcast_can_be_disabled() {
        let (t, log) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0]);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "a", vec![keys[0]]),
        ]);
        let config = PipelineConfig {
            allow_broadcast: false,
            ..PipelineConfig::default()
        };
        let out = run_operation(&Plus, &req, &config);
        assert!(out.is_empty());
        assert!(matches!(
            out.rejection,
            Some(AttrError::CardinalityMismatch { pin: 1, expected: 2, actual: 1 })
        ));
        assert_eq!(log.counts().validation, 1);
    }

    #[test]
    fn constant_input_uses_default() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0]);
        t.create_attribute("bias", 0.5_f64, true, false).unwrap();
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys),
            OperationInput::attribute_entries(&t, "bias"),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![1.5, 2.5]);
        let attr = out.typed_attribute::<f64>(0).unwrap();
        assert!((attr.default_value() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_attribute_rejects() {
        let (t, log) = logged_root();
        let keys = with_values(&t, "a", &[1.0]);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "nope", keys),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert!(out.is_empty());
        assert!(out.entry_keys.is_empty());
        assert!(log.any(|e| matches!(e, DiagnosticEvent::OperationRejected { operation, .. } if operation == "plus")));
    }

    #[test]
    fn unsupported_kind_rejects() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0]);
        t.create_attribute("label", String::new(), false, false).unwrap();
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "label", keys),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        let err = out.rejection.unwrap();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(matches!(err, AttrError::UnsupportedKind { pin: 1, .. }));
    }

    #[test]
    fn wrong_input_count_rejects() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0]);
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "a", keys)]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert!(matches!(
            out.rejection,
            Some(AttrError::InputCount { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn disconnected_outputs_reject() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0]);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "a", keys),
        ])
        .with_output(0, OutputPin::Disconnected);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert!(matches!(out.rejection, Some(AttrError::NoOutputConnected { .. })));
    }

    #[test]
    fn output_replaces_inherited_attribute() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, 2.0]);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "a", keys),
        ])
        .named_output(0, "a");
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert_eq!(out.values::<f64>(0), vec![2.0, 4.0]);
        let a = out.typed_attribute::<f64>(0).unwrap();
        assert!(a.parent().is_none(), "output must not chain to the input");
        assert_eq!(
            t.typed_attribute::<f64>("a").unwrap().get_value_from_item_key(EntryKey::new(1)),
            2.0
        );
    }

    /// `10 * a` for non-negative `a`, nothing otherwise.
    struct ScalePositive;

    impl AttributeOperation for ScalePositive {
        fn name(&self) -> &str {
            "scale_positive"
        }

        fn num_inputs(&self) -> usize {
            1
        }

        fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
            KindSupport::when(kind == ValueKind::Double)
        }

        fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
            cx.apply_unary::<f64, f64>(0, |a| (*a >= 0.0).then_some(a * 10.0))
        }
    }

    /// Same, but always writes a Float output.
    struct ScalePositiveToFloat;

    impl AttributeOperation for ScalePositiveToFloat {
        fn name(&self) -> &str {
            "scale_positive_to_float"
        }

        fn num_inputs(&self) -> usize {
            1
        }

        fn is_supported_kind(&self, kind: ValueKind, _pin: usize) -> KindSupport {
            KindSupport::when(kind == ValueKind::Double)
        }

        fn output_kind(&self, _pin: usize, _most_complex: ValueKind) -> ValueKind {
            ValueKind::Float
        }

        #[allow(clippy::cast_possible_truncation)]
        fn execute(&self, cx: &mut OperationContext<'_>) -> Result<()> {
            cx.apply_unary::<f64, f32>(0, |a| (*a >= 0.0).then_some((a * 10.0) as f32))
        }
    }

    #[test]
    fn skipped_rows_keep_the_primary_value() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, -5.0, 3.0]);
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "a", keys)]);
        let out = run_operation(&ScalePositive, &req, &PipelineConfig::default());
        assert!(out.rejection.is_none());
        assert_eq!(out.values::<f64>(0), vec![10.0, -5.0, 30.0]);
    }

    #[test]
    fn skipped_rows_of_another_kind_keep_the_default() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0, -5.0, 3.0]);
        let req = OperationRequest::new(vec![OperationInput::entries(&t, "a", keys)]);
        let out = run_operation(&ScalePositiveToFloat, &req, &PipelineConfig::default());
        assert_eq!(out.attribute(0).unwrap().kind(), ValueKind::Float);
        assert_eq!(out.values::<f32>(0), vec![10.0, 0.0, 30.0]);
    }

    #[test]
    fn erased_write_of_unbroadcastable_value_is_dropped() {
        let (t, _) = logged_root();
        let keys = with_values(&t, "a", &[1.0]);
        let attr = t.attribute("a").unwrap();
        let writer = Writer::<String>::new(&attr);
        assert!(matches!(writer, Writer::Erased(_)));
        writer.write(keys[0], "text".to_owned());
        assert_eq!(attr.value_from_item_key(keys[0]), MetadataValue::Double(1.0));
    }

    #[test]
    fn invalid_primary_keys_get_fresh_rows() {
        let (t, _) = logged_root();
        let mut keys = with_values(&t, "a", &[1.0]);
        keys.push(EntryKey::INVALID);
        let req = OperationRequest::new(vec![
            OperationInput::entries(&t, "a", keys.clone()),
            OperationInput::entries(&t, "a", keys),
        ]);
        let out = run_operation(&Plus, &req, &PipelineConfig::default());
        assert_eq!(out.entry_keys.len(), 2);
        assert_eq!(out.entry_keys[0], EntryKey::new(0));
        assert_eq!(out.entry_keys[1], EntryKey::new(1));
        let table = out.table.as_ref().unwrap();
        assert_eq!(table.local_item_count(), 1);
        assert_eq!(out.values::<f64>(0), vec![2.0, 0.0]);
    }
}
