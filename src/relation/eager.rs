//! Eager loading for query results.
//!
//! Uses the "selectinload" strategy:
//! 1. Fetch the owners (the query's own results)
//! 2. Collect their primary keys
//! 3. Fetch every related record in one query through the junction
//! 4. Attach each owner's group as its loaded relation
//!
//! One query per relation, regardless of how many owners were returned.

use super::Relation;
use crate::collection::ResultCollection;
use crate::context::Context;
use crate::query::Condition;
use crate::record::{Record, RecordError};
use std::rc::Rc;

/// Load `relation` for every record in `owners` and attach it.
pub(crate) fn eager_load(
    ctx: &Rc<Context>,
    relation: &Rc<dyn Relation>,
    owners: &mut [Record],
    constraint: Option<&Condition>,
) -> Result<(), RecordError> {
    if owners.is_empty() {
        return Ok(());
    }
    let loaded = {
        let refs: Vec<&Record> = owners.iter().collect();
        relation.fetch_results_for_eager_load(ctx, &refs, constraint)?
    };
    log::debug!(
        "Eager-loaded {} for {} {} owners",
        relation.name(),
        loaded.len(),
        relation.owner_table()
    );
    for owner in owners.iter_mut() {
        let collection = owner
            .key()
            .and_then(|key| loaded.get(&key).cloned())
            .unwrap_or_else(ResultCollection::tracked);
        owner.attach_loaded(Rc::clone(relation), collection);
    }
    Ok(())
}
