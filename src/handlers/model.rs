use futures::FutureExt;
use serde_json::Value;

use crate::database::Collection;
use crate::handlers::utils::path_id;
use crate::registry::{HandlerGroup, Operation, OperationError, OperationFuture};
use crate::routing::ResourceType;
use crate::types::RequestData;

pub struct ModelHandler;

impl HandlerGroup for ModelHandler {
    fn name(&self) -> &'static str {
        "ModelHandler"
    }

    fn operations(&self) -> Vec<Operation> {
        vec![Operation::new("field_names", field_names)]
    }
}

fn field_names(col: &mut Collection, _data: RequestData, ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let model_id = path_id(&ids, 1, ResourceType::Model)?;
        let model = col
            .model_by_id(model_id)
            .await?
            .ok_or_else(|| OperationError::ModelNotFound(model_id.to_string()))?;

        let names = model.field_names().into_iter().map(Value::String).collect();
        Ok(Some(Value::Array(names)))
    }
    .boxed()
}
