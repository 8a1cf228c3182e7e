use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    Account, AccountChanges, AccountStore, NewAccount, NewTask, StoreError, StoreResult, StreakState, Task,
    TaskChanges, TaskStore,
};

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i32, Account>,
    tasks: BTreeMap<i32, Task>,
    next_account_id: i32,
    next_task_id: i32,
}

impl Tables {
    fn login_name_taken(&self, login_name: &str, except: Option<i32>) -> bool {
        self.accounts.values().any(|a| a.login_name == login_name && Some(a.id) != except)
    }
}

/// In-process store with the same constraints as the relational schema:
/// unique login names, tasks referencing existing accounts, cascade on delete.
/// Every operation holds the lock for its whole read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Account>> {
        Ok(self.inner.lock().accounts.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Account>> {
        Ok(self.inner.lock().accounts.get(&id).cloned())
    }

    async fn find_by_login_name(&self, login_name: &str) -> StoreResult<Option<Account>> {
        Ok(self.inner.lock().accounts.values().find(|a| a.login_name == login_name).cloned())
    }

    async fn insert(&self, account: NewAccount) -> StoreResult<Account> {
        let mut t = self.inner.lock();
        if t.login_name_taken(&account.login_name, None) {
            return Err(StoreError::Conflict("correo".into()));
        }
        t.next_account_id += 1;
        let row = Account {
            id: t.next_account_id,
            name: account.name,
            login_name: account.login_name,
            secret_hash: account.secret_hash,
            created_on: account.created_on,
            level: account.level,
            role: account.role,
            streak: 0,
            last_login: None,
        };
        t.accounts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: i32, changes: AccountChanges) -> StoreResult<Option<Account>> {
        let mut t = self.inner.lock();
        if !t.accounts.contains_key(&id) { return Ok(None); }
        if let Some(login) = changes.login_name.as_deref() {
            if t.login_name_taken(login, Some(id)) {
                return Err(StoreError::Conflict("correo".into()));
            }
        }
        let Some(row) = t.accounts.get_mut(&id) else { return Ok(None); };
        if let Some(v) = changes.name { row.name = v; }
        if let Some(v) = changes.login_name { row.login_name = v; }
        if let Some(v) = changes.created_on { row.created_on = v; }
        if let Some(v) = changes.level { row.level = v; }
        if let Some(v) = changes.role { row.role = v; }
        if let Some(v) = changes.secret_hash { row.secret_hash = v; }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: i32) -> StoreResult<Option<Account>> {
        let mut t = self.inner.lock();
        let removed = t.accounts.remove(&id);
        if removed.is_some() {
            t.tasks.retain(|_, task| task.account_id != id);
        }
        Ok(removed)
    }

    async fn compare_and_set_streak(&self, id: i32, expected: StreakState, next: StreakState) -> StoreResult<Option<Account>> {
        let mut t = self.inner.lock();
        match t.accounts.get_mut(&id) {
            Some(row) if row.streak_state() == expected => {
                row.streak = next.streak;
                row.last_login = next.last_login;
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<Task>> {
        Ok(self.inner.lock().tasks.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<Task>> {
        Ok(self.inner.lock().tasks.get(&id).cloned())
    }

    async fn list_by_account(&self, account_id: i32) -> StoreResult<Vec<Task>> {
        Ok(self.inner.lock().tasks.values().filter(|t| t.account_id == account_id).cloned().collect())
    }

    async fn insert(&self, task: NewTask) -> StoreResult<Task> {
        let mut t = self.inner.lock();
        if !t.accounts.contains_key(&task.account_id) {
            return Err(StoreError::InvalidReference("usuario".into()));
        }
        t.next_task_id += 1;
        let row = Task {
            id: t.next_task_id,
            account_id: task.account_id,
            description: task.description,
            points: task.points,
            completed: task.completed,
        };
        t.tasks.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: i32, changes: TaskChanges) -> StoreResult<Option<Task>> {
        let mut t = self.inner.lock();
        if !t.tasks.contains_key(&id) { return Ok(None); }
        if let Some(owner) = changes.account_id {
            if !t.accounts.contains_key(&owner) {
                return Err(StoreError::InvalidReference("usuario".into()));
            }
        }
        let Some(row) = t.tasks.get_mut(&id) else { return Ok(None); };
        if let Some(v) = changes.account_id { row.account_id = v; }
        if let Some(v) = changes.description { row.description = v; }
        if let Some(v) = changes.points { row.points = v; }
        if let Some(v) = changes.completed { row.completed = v; }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: i32) -> StoreResult<Option<Task>> {
        Ok(self.inner.lock().tasks.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use chrono::NaiveDate;

    fn new_account(login: &str) -> NewAccount {
        NewAccount {
            name: "Ana".into(),
            login_name: login.into(),
            secret_hash: "$argon2id$stub".into(),
            created_on: "2024-01-01".into(),
            level: 0,
            role: Role::Usuario,
        }
    }

    fn new_task(owner: i32) -> NewTask {
        NewTask { account_id: owner, description: "barrer".into(), points: 5, completed: 0 }
    }

    #[tokio::test]
    async fn duplicate_login_name_conflicts_and_keeps_original() {
        let s = MemoryStore::new();
        let first = AccountStore::insert(&s, new_account("ana@x")).await.unwrap();
        let mut dup = new_account("ana@x");
        dup.name = "Impostor".into();
        assert_eq!(AccountStore::insert(&s, dup).await, Err(StoreError::Conflict("correo".into())));
        assert_eq!(AccountStore::find_by_id(&s, first.id).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn login_names_are_case_sensitive() {
        let s = MemoryStore::new();
        AccountStore::insert(&s, new_account("ana@x")).await.unwrap();
        assert!(AccountStore::insert(&s, new_account("Ana@x")).await.is_ok());
        assert!(s.find_by_login_name("ANA@X").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_to_taken_login_name_conflicts() {
        let s = MemoryStore::new();
        AccountStore::insert(&s, new_account("a@x")).await.unwrap();
        let b = AccountStore::insert(&s, new_account("b@x")).await.unwrap();
        let changes = AccountChanges { login_name: Some("a@x".into()), ..Default::default() };
        assert!(matches!(AccountStore::update(&s, b.id, changes).await, Err(StoreError::Conflict(_))));
        let keep_own = AccountChanges { login_name: Some("b@x".into()), ..Default::default() };
        assert!(AccountStore::update(&s, b.id, keep_own).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn streak_cas_only_applies_on_expected_state() {
        let s = MemoryStore::new();
        let a = AccountStore::insert(&s, new_account("su@x")).await.unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let next = StreakState { streak: 1, last_login: Some(today) };
        let stale = StreakState { streak: 3, last_login: None };
        assert!(s.compare_and_set_streak(a.id, stale, next).await.unwrap().is_none());
        let updated = s.compare_and_set_streak(a.id, a.streak_state(), next).await.unwrap().unwrap();
        assert_eq!(updated.streak_state(), next);
        // second writer with the old expectation loses
        assert!(s.compare_and_set_streak(a.id, a.streak_state(), next).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tasks_require_existing_owner_and_cascade() {
        let s = MemoryStore::new();
        assert_eq!(TaskStore::insert(&s, new_task(99)).await, Err(StoreError::InvalidReference("usuario".into())));
        let a = AccountStore::insert(&s, new_account("o@x")).await.unwrap();
        let t = TaskStore::insert(&s, new_task(a.id)).await.unwrap();
        assert_eq!(s.list_by_account(a.id).await.unwrap(), vec![t.clone()]);
        AccountStore::delete(&s, a.id).await.unwrap();
        assert!(TaskStore::find_by_id(&s, t.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn task_update_missing_row_is_none() {
        let s = MemoryStore::new();
        let changes = TaskChanges { points: Some(3), ..Default::default() };
        assert!(TaskStore::update(&s, 1, changes).await.unwrap().is_none());
    }
}
