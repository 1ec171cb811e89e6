use std::sync::Arc;

use async_trait::async_trait;
use tonic::{Response, Status};

use super::{ChannelSlot, CloseGuard, GrpcClientConfig, connect_channel, map_status};
use crate::error::{ConnectionError, ServiceError};
use crate::model::{Account, Pagination};
use crate::pb::account as pb;

const SERVICE: &str = "account";

#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn post_account(
        &self,
        request: pb::PostAccountRequest,
    ) -> Result<pb::PostAccountResponse, Status>;

    async fn get_account(
        &self,
        request: pb::GetAccountRequest,
    ) -> Result<pb::GetAccountResponse, Status>;

    async fn get_accounts(
        &self,
        request: pb::GetAccountsRequest,
    ) -> Result<pb::GetAccountsResponse, Status>;

    fn shutdown(&self) {}
}

pub struct GrpcAccountBackend {
    slot: ChannelSlot,
}

#[async_trait]
impl AccountBackend for GrpcAccountBackend {
    async fn post_account(
        &self,
        request: pb::PostAccountRequest,
    ) -> Result<pb::PostAccountResponse, Status> {
        pb::AccountServiceClient::new(self.slot.channel()?)
            .post_account(request)
            .await
            .map(Response::into_inner)
    }

    async fn get_account(
        &self,
        request: pb::GetAccountRequest,
    ) -> Result<pb::GetAccountResponse, Status> {
        pb::AccountServiceClient::new(self.slot.channel()?)
            .get_account(request)
            .await
            .map(Response::into_inner)
    }

    async fn get_accounts(
        &self,
        request: pb::GetAccountsRequest,
    ) -> Result<pb::GetAccountsResponse, Status> {
        pb::AccountServiceClient::new(self.slot.channel()?)
            .get_accounts(request)
            .await
            .map(Response::into_inner)
    }

    fn shutdown(&self) {
        self.slot.release();
    }
}

#[derive(Clone)]
pub struct AccountClient {
    backend: Arc<dyn AccountBackend>,
    guard: Arc<CloseGuard>,
}

impl AccountClient {
    pub async fn connect(target: &str, cfg: &GrpcClientConfig) -> Result<Self, ConnectionError> {
        let channel = connect_channel(SERVICE, target, cfg).await?;
        Ok(Self::with_backend(Arc::new(GrpcAccountBackend {
            slot: ChannelSlot::new(channel),
        })))
    }

    pub fn with_backend(backend: Arc<dyn AccountBackend>) -> Self {
        AccountClient {
            backend,
            guard: Arc::new(CloseGuard::new(SERVICE)),
        }
    }

    pub fn close(&self) {
        self.guard.close(|| self.backend.shutdown());
    }

    pub async fn create_account(&self, name: &str) -> Result<Account, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::invalid_argument("account name must not be empty"));
        }
        self.guard.ensure_open()?;
        let response = self
            .backend
            .post_account(pb::PostAccountRequest {
                name: name.to_string(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "PostAccount", status))?;
        response
            .account
            .map(decode_account)
            .ok_or_else(|| ServiceError::decode("PostAccount response carried no account"))
    }

    pub async fn get_account(&self, id: &str) -> Result<Account, ServiceError> {
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_account(pb::GetAccountRequest { id: id.to_string() })
            .await
            .map_err(|status| map_status(SERVICE, "GetAccount", status))?;
        response
            .account
            .map(decode_account)
            .ok_or_else(|| ServiceError::not_found(format!("account {id} not found")))
    }

    pub async fn list_accounts(&self, page: Pagination) -> Result<Vec<Account>, ServiceError> {
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_accounts(pb::GetAccountsRequest {
                skip: page.skip,
                take: page.take,
                ids: Vec::new(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "GetAccounts", status))?;
        Ok(response.accounts.into_iter().map(decode_account).collect())
    }

    /// Batch lookup. Unknown ids are simply absent from the result.
    pub async fn get_accounts(&self, ids: &[String]) -> Result<Vec<Account>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.guard.ensure_open()?;
        let response = self
            .backend
            .get_accounts(pb::GetAccountsRequest {
                skip: 0,
                take: ids.len() as u64,
                ids: ids.to_vec(),
            })
            .await
            .map_err(|status| map_status(SERVICE, "GetAccounts", status))?;
        Ok(response.accounts.into_iter().map(decode_account).collect())
    }
}

fn decode_account(account: pb::Account) -> Account {
    Account {
        id: account.id,
        name: account.name,
    }
}
