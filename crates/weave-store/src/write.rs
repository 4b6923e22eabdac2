use weave_types::Record;

/// A single operation of a bulk write.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Record,
    },
    ReplaceOne {
        filter: Record,
        replacement: Record,
        upsert: bool,
    },
    UpdateOne {
        filter: Record,
        update: Record,
        upsert: bool,
    },
    UpdateMany {
        filter: Record,
        update: Record,
    },
    DeleteOne {
        filter: Record,
    },
    DeleteMany {
        filter: Record,
    },
}

impl WriteModel {
    /// Short operation name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertOne { .. } => "insert_one",
            Self::ReplaceOne { .. } => "replace_one",
            Self::UpdateOne { .. } => "update_one",
            Self::UpdateMany { .. } => "update_many",
            Self::DeleteOne { .. } => "delete_one",
            Self::DeleteMany { .. } => "delete_many",
        }
    }
}
