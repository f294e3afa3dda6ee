// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! The main entry point for the SensorQL API lambda function.

use lambda_runtime::{service_fn, LambdaEvent};
use sensorql::prelude::*;
use sensorql_function::aws::{handler, ProxyRequest};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let factory = Arc::new(DatabricksConnectionFactory::from_env()?);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<ProxyRequest>| {
        let factory = factory.clone();
        async move { handler(event.payload, factory.as_ref()).await }
    }))
    .await?;
    Ok(())
}
