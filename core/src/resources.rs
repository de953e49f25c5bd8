//! Resource convenience methods: path templates over the request core.
//!
//! Projects, passwords, personal passwords, favorites, users, groups,
//! files and version checks. Methods that only exist from a given API
//! version check `ApiVersion` before touching the network.

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::client::{RequestOptions, TpmClient};
use crate::config::ApiVersion;
use crate::error::{Result, TpmError};
use crate::http::Transport;
use crate::types::{CreatedResource, VersionInfo};

fn payload<D: Serialize + ?Sized>(data: &D) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| TpmError::Serialization(e.to_string()))
}

/// Form-encode a search string for use as a path segment (space becomes `+`).
pub fn encode_search(term: &str) -> String {
    url::form_urlencoded::byte_serialize(term.as_bytes()).collect()
}

impl<T: Transport> TpmClient<T> {
    fn require(&self, minimum: ApiVersion, operation: &'static str) -> Result<()> {
        let version = self.config().version();
        if version < minimum {
            return Err(TpmError::Unsupported {
                operation,
                version: version.to_string(),
            });
        }
        Ok(())
    }

    fn show(&self, path: &str) -> Result<Value> {
        Ok(self.get(path)?.unwrap_or(Value::Null))
    }

    fn create<D: Serialize + ?Sized>(&self, path: &str, data: &D) -> Result<u64> {
        let body = payload(data)?;
        let response = self.post(path, Some(&body))?.unwrap_or(Value::Null);
        let created: CreatedResource =
            serde_json::from_value(response.clone()).map_err(|e| TpmError::MalformedResponse {
                diagnostic: e.to_string(),
                url: self.url_for(path),
                body: response.to_string(),
            })?;
        Ok(created.id)
    }

    fn update<D: Serialize + ?Sized>(&self, path: &str, data: &D) -> Result<()> {
        let body = payload(data)?;
        self.put(path, Some(&body)).map(|_| ())
    }

    fn action(&self, path: &str) -> Result<()> {
        self.put(path, None).map(|_| ())
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.delete(path).map(|_| ())
    }

    // Projects

    pub fn list_projects(&self) -> Result<Vec<Value>> {
        debug!("List all projects.");
        self.collection("projects.json")
    }

    pub fn list_projects_archived(&self) -> Result<Vec<Value>> {
        debug!("List all archived projects.");
        self.collection("projects/archived.json")
    }

    pub fn list_projects_favorite(&self) -> Result<Vec<Value>> {
        debug!("List all favorite projects.");
        self.collection("projects/favorite.json")
    }

    pub fn list_projects_search(&self, search: &str) -> Result<Vec<Value>> {
        debug!("List all projects with: {search}");
        self.collection(&format!("projects/search/{}.json", encode_search(search)))
    }

    pub fn show_project(&self, id: u64) -> Result<Value> {
        debug!("Show project info: {id}");
        self.show(&format!("projects/{id}.json"))
    }

    pub fn list_passwords_of_project(&self, id: u64) -> Result<Vec<Value>> {
        debug!("List passwords of project: {id}");
        self.collection(&format!("projects/{id}/passwords.json"))
    }

    pub fn list_user_access_on_project(&self, id: u64) -> Result<Vec<Value>> {
        debug!("List user access on project: {id}");
        self.collection(&format!("projects/{id}/security.json"))
    }

    /// Create a project and return its id.
    pub fn create_project<D: Serialize + ?Sized>(&self, data: &D) -> Result<u64> {
        let id = self.create("projects.json", data)?;
        info!("Project has been created with ID {id}");
        Ok(id)
    }

    pub fn update_project<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update project {id}");
        self.update(&format!("projects/{id}.json"), data)
    }

    pub fn change_parent_of_project(&self, id: u64, new_parent_id: u64) -> Result<()> {
        info!("Change parent for project {id} to {new_parent_id}");
        self.update(
            &format!("projects/{id}/change_parent.json"),
            &serde_json::json!({ "parent_id": new_parent_id }),
        )
    }

    pub fn update_security_of_project<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update project {id} security");
        self.update(&format!("projects/{id}/security.json"), data)
    }

    pub fn archive_project(&self, id: u64) -> Result<()> {
        info!("Archive project {id}");
        self.action(&format!("projects/{id}/archive.json"))
    }

    pub fn unarchive_project(&self, id: u64) -> Result<()> {
        info!("Unarchive project {id}");
        self.action(&format!("projects/{id}/unarchive.json"))
    }

    pub fn delete_project(&self, id: u64) -> Result<()> {
        info!("Delete project {id}");
        self.remove(&format!("projects/{id}.json"))
    }

    /// Subprojects of a project. API v4 and later.
    pub fn list_subprojects(&self, id: u64) -> Result<Vec<Value>> {
        self.require(ApiVersion::V4, "list_subprojects")?;
        self.collection(&format!("projects/{id}/subprojects.json"))
    }

    /// Subprojects on which the user may perform `action` (e.g. `new_pwd`).
    /// API v4 and later.
    pub fn list_subprojects_action(&self, id: u64, action: &str) -> Result<Vec<Value>> {
        self.require(ApiVersion::V4, "list_subprojects_action")?;
        self.collection(&format!("projects/{id}/subprojects/{action}.json"))
    }

    // Passwords

    pub fn list_passwords(&self) -> Result<Vec<Value>> {
        debug!("List all passwords.");
        self.collection("passwords.json")
    }

    pub fn list_passwords_archived(&self) -> Result<Vec<Value>> {
        debug!("List archived passwords.");
        self.collection("passwords/archived.json")
    }

    pub fn list_passwords_favorite(&self) -> Result<Vec<Value>> {
        debug!("List favorite passwords.");
        self.collection("passwords/favorite.json")
    }

    pub fn list_passwords_search(&self, search: &str) -> Result<Vec<Value>> {
        debug!("List all passwords with: {search}");
        self.collection(&format!("passwords/search/{}.json", encode_search(search)))
    }

    pub fn show_password(&self, id: u64) -> Result<Value> {
        info!("Show password info: {id}");
        self.show(&format!("passwords/{id}.json"))
    }

    /// Read a locked password, recording `reason` in the server's audit log.
    pub fn show_password_with_reason(&self, id: u64, reason: &str) -> Result<Value> {
        info!("Show locked password {id}");
        let options = RequestOptions::with_unlock_reason(reason);
        Ok(self
            .get_with(&format!("passwords/{id}.json"), &options)?
            .unwrap_or(Value::Null))
    }

    pub fn list_user_access_on_password(&self, id: u64) -> Result<Vec<Value>> {
        debug!("List user access on password {id}");
        self.collection(&format!("passwords/{id}/security.json"))
    }

    pub fn create_password<D: Serialize + ?Sized>(&self, data: &D) -> Result<u64> {
        let id = self.create("passwords.json", data)?;
        info!("Password has been created with ID {id}");
        Ok(id)
    }

    pub fn update_password<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update password {id}");
        self.update(&format!("passwords/{id}.json"), data)
    }

    pub fn update_security_of_password<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update security of password {id}");
        self.update(&format!("passwords/{id}/security.json"), data)
    }

    pub fn update_custom_fields_of_password<D: Serialize + ?Sized>(
        &self,
        id: u64,
        data: &D,
    ) -> Result<()> {
        info!("Update custom fields of password {id}");
        self.update(&format!("passwords/{id}/custom_fields.json"), data)
    }

    pub fn delete_password(&self, id: u64) -> Result<()> {
        info!("Delete password {id}");
        self.remove(&format!("passwords/{id}.json"))
    }

    pub fn lock_password(&self, id: u64) -> Result<()> {
        info!("Lock password {id}");
        self.action(&format!("passwords/{id}/lock.json"))
    }

    /// Unlock a password. The reason is sent with this call only.
    pub fn unlock_password(&self, id: u64, reason: &str) -> Result<()> {
        info!("Unlock password {id}, Reason: {reason}");
        let options = RequestOptions::with_unlock_reason(reason);
        self.put_with(&format!("passwords/{id}/unlock.json"), None, &options)
            .map(|_| ())
    }

    // My passwords

    pub fn list_mypasswords(&self) -> Result<Vec<Value>> {
        debug!("List MyPasswords");
        self.collection("my_passwords.json")
    }

    pub fn list_mypasswords_search(&self, search: &str) -> Result<Vec<Value>> {
        debug!("List MyPasswords with {search}");
        self.collection(&format!("my_passwords/search/{}.json", encode_search(search)))
    }

    pub fn show_mypassword(&self, id: u64) -> Result<Value> {
        debug!("Show MyPassword {id}");
        self.show(&format!("my_passwords/{id}.json"))
    }

    pub fn create_mypassword<D: Serialize + ?Sized>(&self, data: &D) -> Result<u64> {
        let id = self.create("my_passwords.json", data)?;
        info!("MyPassword has been created with {id}");
        Ok(id)
    }

    pub fn update_mypassword<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update MyPassword {id}");
        self.update(&format!("my_passwords/{id}.json"), data)
    }

    pub fn delete_mypassword(&self, id: u64) -> Result<()> {
        info!("Delete MyPassword {id}");
        self.remove(&format!("my_passwords/{id}.json"))
    }

    // Favorites

    pub fn set_favorite_password(&self, id: u64) -> Result<()> {
        info!("Set password {id} as favorite");
        self.post(&format!("favorite_passwords/{id}.json"), None)
            .map(|_| ())
    }

    pub fn unset_favorite_password(&self, id: u64) -> Result<()> {
        info!("Unset password {id} as favorite");
        self.remove(&format!("favorite_passwords/{id}.json"))
    }

    pub fn set_favorite_project(&self, id: u64) -> Result<()> {
        info!("Set project {id} as favorite");
        self.post(&format!("favorite_project/{id}.json"), None)
            .map(|_| ())
    }

    pub fn unset_favorite_project(&self, id: u64) -> Result<()> {
        info!("Unset project {id} as favorite");
        self.remove(&format!("favorite_project/{id}.json"))
    }

    // Users

    pub fn list_users(&self) -> Result<Vec<Value>> {
        debug!("List users");
        self.collection("users.json")
    }

    pub fn show_user(&self, id: u64) -> Result<Value> {
        debug!("Show user {id}");
        self.show(&format!("users/{id}.json"))
    }

    /// The user the client authenticates as.
    pub fn show_me(&self) -> Result<Value> {
        debug!("Show Info about own user");
        self.show("users/me.json")
    }

    pub fn who_am_i(&self) -> Result<Value> {
        self.show_me()
    }

    pub fn create_user<D: Serialize + ?Sized>(&self, data: &D) -> Result<u64> {
        let id = self.create("users.json", data)?;
        info!("User has been created with ID {id}");
        Ok(id)
    }

    pub fn update_user<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update user {id}");
        self.update(&format!("users/{id}.json"), data)
    }

    pub fn change_user_password<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Change user {id} password");
        self.update(&format!("users/{id}/change_password.json"), data)
    }

    pub fn activate_user(&self, id: u64) -> Result<()> {
        info!("Activate user {id}");
        self.action(&format!("users/{id}/activate.json"))
    }

    pub fn deactivate_user(&self, id: u64) -> Result<()> {
        info!("Deactivate user {id}");
        self.action(&format!("users/{id}/deactivate.json"))
    }

    pub fn convert_user_to_ldap(&self, id: u64, login_dn: &str) -> Result<()> {
        info!("Convert User {id} to LDAP DN {login_dn}");
        self.update(
            &format!("users/{id}/convert_to_ldap.json"),
            &serde_json::json!({ "login_dn": login_dn }),
        )
    }

    pub fn convert_ldap_user_to_normal(&self, id: u64) -> Result<()> {
        info!("Convert User {id} from LDAP to normal user");
        self.action(&format!("users/{id}/convert_to_normal.json"))
    }

    pub fn delete_user(&self, id: u64) -> Result<()> {
        info!("Delete user {id}");
        self.remove(&format!("users/{id}.json"))
    }

    // Groups

    pub fn list_groups(&self) -> Result<Vec<Value>> {
        debug!("List groups");
        self.collection("groups.json")
    }

    pub fn show_group(&self, id: u64) -> Result<Value> {
        debug!("Show group {id}");
        self.show(&format!("groups/{id}.json"))
    }

    pub fn create_group<D: Serialize + ?Sized>(&self, data: &D) -> Result<u64> {
        let id = self.create("groups.json", data)?;
        info!("Group has been created with ID {id}");
        Ok(id)
    }

    pub fn update_group<D: Serialize + ?Sized>(&self, id: u64, data: &D) -> Result<()> {
        info!("Update group {id}");
        self.update(&format!("groups/{id}.json"), data)
    }

    pub fn add_user_to_group(&self, group_id: u64, user_id: u64) -> Result<()> {
        info!("Add User {user_id} to Group {group_id}");
        self.action(&format!("groups/{group_id}/add_user/{user_id}.json"))
    }

    pub fn delete_user_from_group(&self, group_id: u64, user_id: u64) -> Result<()> {
        info!("Delete user {user_id} from group {group_id}");
        self.action(&format!("groups/{group_id}/delete_user/{user_id}.json"))
    }

    pub fn delete_group(&self, id: u64) -> Result<()> {
        info!("Delete group {id}");
        self.remove(&format!("groups/{id}.json"))
    }

    // Files (API v5)

    pub fn list_files_of_password(&self, id: u64) -> Result<Vec<Value>> {
        self.require(ApiVersion::V5, "list_files_of_password")?;
        self.collection(&format!("passwords/{id}/files.json"))
    }

    pub fn list_files_of_project(&self, id: u64) -> Result<Vec<Value>> {
        self.require(ApiVersion::V5, "list_files_of_project")?;
        self.collection(&format!("projects/{id}/files.json"))
    }

    pub fn show_file(&self, id: u64) -> Result<Value> {
        self.require(ApiVersion::V5, "show_file")?;
        self.show(&format!("files/{id}.json"))
    }

    pub fn delete_file(&self, id: u64) -> Result<()> {
        self.require(ApiVersion::V5, "delete_file")?;
        info!("Delete file {id}");
        self.remove(&format!("files/{id}.json"))
    }

    // Generator and version

    pub fn generate_password(&self) -> Result<Value> {
        debug!("Generate new password");
        self.show("generate_password.json")
    }

    pub fn get_version(&self) -> Result<Value> {
        debug!("Get version information");
        self.show("version.json")
    }

    pub fn get_latest_version(&self) -> Result<Value> {
        debug!("Get latest version");
        self.show("version/check_latest.json")
    }

    /// Whether the server runs the latest released version.
    pub fn up_to_date(&self) -> Result<bool> {
        let path = "version/check_latest.json";
        let report = self.show(path)?;
        let info: VersionInfo =
            serde_json::from_value(report.clone()).map_err(|e| TpmError::MalformedResponse {
                diagnostic: e.to_string(),
                url: self.url_for(path),
                body: report.to_string(),
            })?;
        if info.is_up_to_date() {
            info!("TeamPasswordManager is up-to-date!");
        } else {
            warn!("TeamPasswordManager is not up-to-date!");
        }
        debug!(
            "Current Version: {} Latest Version: {}",
            info.version,
            info.latest_version.as_deref().unwrap_or("unknown")
        );
        Ok(info.is_up_to_date())
    }
}
