//! sled trees backing the workflow, and the CBOR codec around them
use super::approval::ApprovalRecord;
use super::error::WorkflowError;
use super::event::{Event, EventDetails, EventFile};
use super::utils::{sequence_key, sequence_prefix};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionResult, TransactionalTree,
};
use sled::{Db, Tree};

const EVENTS: &str = "events";
const APPROVALS: &str = "approvals";
const DETAILS: &str = "details";
const FILES: &str = "files";

#[derive(Clone)]
pub(crate) struct Store {
    pub(crate) events: Tree,    // event id -> Event
    pub(crate) approvals: Tree, // event id # sequence -> ApprovalRecord
    pub(crate) details: Tree,   // sha256 of cbor -> EventDetails
    pub(crate) files: Tree,     // file id -> EventFile
}

impl Store {
    pub(crate) fn open(instance: &Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            events: instance.open_tree(EVENTS)?,
            approvals: instance.open_tree(APPROVALS)?,
            details: instance.open_tree(DETAILS)?,
            files: instance.open_tree(FILES)?,
        })
    }

    pub(crate) fn load_event(&self, event_id: &str) -> Result<Option<Event>, WorkflowError> {
        self.events
            .get(event_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The chain of an event in precedence order.
    pub(crate) fn load_chain(&self, event_id: &str) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.approvals
            .scan_prefix(sequence_prefix(event_id))
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    pub(crate) fn load_files(&self, event: &Event) -> Result<Vec<EventFile>, WorkflowError> {
        let mut files = Vec::with_capacity(event.file_ids.len());
        for id in &event.file_ids {
            if let Some(bytes) = self.files.get(id.as_bytes())? {
                files.push(decode(&bytes)?);
            }
        }
        Ok(files)
    }

    pub(crate) fn load_details(&self, hash: &str) -> Result<Option<EventDetails>, WorkflowError> {
        self.details
            .get(hash.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub(crate) fn all_events(&self) -> Result<Vec<Event>, WorkflowError> {
        self.events
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }

    pub(crate) fn all_approvals(&self) -> Result<Vec<ApprovalRecord>, WorkflowError> {
        self.approvals
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, WorkflowError> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::Codec(e.to_string()))
}

pub(crate) fn decode<T>(bytes: &[u8]) -> Result<T, WorkflowError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| WorkflowError::Codec(e.to_string()))
}

pub(crate) fn tx_load<T>(
    tree: &TransactionalTree,
    key: &[u8],
) -> ConflictableTransactionResult<Option<T>, WorkflowError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => decode(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub(crate) fn tx_save<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &[u8],
    value: &T,
) -> ConflictableTransactionResult<(), WorkflowError> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key, bytes)?;
    Ok(())
}

/// Reads the whole chain inside a transaction. Transactional trees cannot scan,
/// so the event's `chain_len` names every key.
pub(crate) fn tx_load_chain(
    approvals: &TransactionalTree,
    event: &Event,
) -> ConflictableTransactionResult<Vec<ApprovalRecord>, WorkflowError> {
    let mut chain = Vec::with_capacity(event.chain_len as usize);
    for sequence in 0..event.chain_len {
        match tx_load(approvals, &sequence_key(&event.id, sequence))? {
            Some(record) => chain.push(record),
            None => {
                return Err(ConflictableTransactionError::Abort(WorkflowError::Codec(
                    format!("approval chain of '{}' is missing step {sequence}", event.id),
                )));
            }
        }
    }
    Ok(chain)
}

pub(crate) fn tx_save_chain(
    approvals: &TransactionalTree,
    chain: &[ApprovalRecord],
) -> ConflictableTransactionResult<(), WorkflowError> {
    for record in chain {
        tx_save(approvals, &sequence_key(&record.event_id, record.sequence), record)?;
    }
    Ok(())
}

/// Unwraps a transaction outcome into the caller-facing error.
pub(crate) fn settle<T>(result: TransactionResult<T, WorkflowError>) -> Result<T, WorkflowError> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => WorkflowError::Storage(e),
    })
}
