use hcpinfra_cloud::model::{NetworkSecurityGroup, ResourceGroup, RoleAssignmentCreate, RoleAssignmentProperties};
use hcpinfra_cloud::{CancellationToken, CloudApi, CloudConfiguration, CloudError};
use hcpinfra_cloud_azure::{AzureClient, ClientSecretCredential};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "tenant-1";
const SUB: &str = "00000000-0000-0000-0000-000000000001";

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TENANT)))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "test-token"
        })))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> AzureClient {
    let cloud = CloudConfiguration::default();
    let credential = ClientSecretCredential::new(TENANT, "client", "secret", &cloud)
        .with_authority_host(server.uri());
    AzureClient::new(SUB, Arc::new(credential), cloud)
        .with_endpoints(server.uri(), server.uri())
        .with_poll_interval(Duration::from_millis(10))
}

fn rg_path(name: &str) -> String {
    format!("/subscriptions/{}/resourcegroups/{}", SUB, name)
}

#[tokio::test]
async fn test_create_resource_group_signs_request_and_caches_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TENANT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 3599,
            "access_token": "test-token"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(rg_path("demo-abc")))
        .and(query_param("api-version", "2021-04-01"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": format!("/subscriptions/{}/resourceGroups/demo-abc", SUB),
            "name": "demo-abc",
            "location": "eastus",
            "tags": {"team": "hcp"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(rg_path("demo-abc")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "demo-abc",
            "location": "eastus"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut group = ResourceGroup {
        location: "eastus".into(),
        ..Default::default()
    };
    group.tags.insert("team".into(), "hcp".into());

    let created = client
        .create_or_update_resource_group("demo-abc", &group)
        .await
        .unwrap();
    assert_eq!(created.name.as_deref(), Some("demo-abc"));
    assert_eq!(created.tags.get("team").map(String::as_str), Some("hcp"));

    let fetched = client.get_resource_group("demo-abc").await.unwrap();
    assert_eq!(fetched.location, "eastus");
}

#[tokio::test]
async fn test_token_failure_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_resource_group("any")
        .await
        .unwrap_err();
    match err {
        CloudError::AuthenticationFailed(msg) => assert!(msg.contains("invalid_client")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_check_existence() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("HEAD"))
        .and(path(rg_path("present")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(rg_path("absent")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(rg_path("accepted")))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(rg_path("denied")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.check_resource_group_existence("present").await.unwrap());
    assert!(!client.check_resource_group_existence("absent").await.unwrap());
    assert!(client.check_resource_group_existence("accepted").await.unwrap());
    let err = client
        .check_resource_group_existence("denied")
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn test_delete_resource_group_polls_async_operation() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let op_url = format!("{}/operations/rg-delete", server.uri());

    Mock::given(method("DELETE"))
        .and(path(rg_path("demo-abc")))
        .respond_with(
            ResponseTemplate::new(202).insert_header("Azure-AsyncOperation", op_url.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/rg-delete"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Retry-After", "0")
                .set_body_json(json!({"status": "InProgress"})),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/rg-delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;

    let lro = client(&server)
        .begin_delete_resource_group("demo-abc")
        .await
        .unwrap();
    assert!(!lro.is_done());
    lro.poll_until_done(&CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_group_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("DELETE"))
        .and(path(rg_path("gone")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": "ResourceGroupNotFound",
                "message": "Resource group 'gone' could not be found."
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .begin_delete_resource_group("gone")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), Some("ResourceGroupNotFound"));
}

#[tokio::test]
async fn test_failed_operation_is_surfaced() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let id = format!(
        "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Network/loadBalancers/lb",
        SUB
    );
    Mock::given(method("DELETE"))
        .and(path(id.as_str()))
        .and(query_param("api-version", "2023-11-01"))
        .respond_with(ResponseTemplate::new(202).insert_header(
            "Azure-AsyncOperation",
            format!("{}/operations/lb", server.uri()).as_str(),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/lb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"code": "InUseByVirtualMachine", "message": "still attached"}
        })))
        .mount(&server)
        .await;

    let lro = client(&server)
        .begin_delete_resource_by_id(&id, "2023-11-01")
        .await
        .unwrap();
    let err = lro
        .poll_until_done(&CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        CloudError::OperationFailed { status, message } => {
            assert_eq!(status, "Failed");
            assert!(message.contains("InUseByVirtualMachine"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_create_nsg_fetches_final_resource() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let nsg_path = format!(
        "/subscriptions/{}/resourceGroups/demo-nsg-abc/providers/Microsoft.Network/networkSecurityGroups/demo-abc-nsg",
        SUB
    );

    Mock::given(method("PUT"))
        .and(path(nsg_path.as_str()))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header(
                    "Azure-AsyncOperation",
                    format!("{}/operations/nsg", server.uri()).as_str(),
                )
                .set_body_json(json!({"name": "demo-abc-nsg", "properties": {"provisioningState": "Updating"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/nsg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(nsg_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": nsg_path.clone(),
            "name": "demo-abc-nsg",
            "location": "eastus",
            "properties": {"provisioningState": "Succeeded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let nsg = client(&server)
        .begin_create_network_security_group(
            "demo-nsg-abc",
            "demo-abc-nsg",
            &NetworkSecurityGroup {
                location: Some("eastus".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .poll_until_done(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(nsg.id.as_deref(), Some(nsg_path.as_str()));
}

#[tokio::test]
async fn test_role_assignment_listing_follows_next_link() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let scope = format!("/subscriptions/{}/resourceGroups/demo-abc", SUB);
    let list_path = format!("{}/providers/Microsoft.Authorization/roleAssignments", scope);

    Mock::given(method("GET"))
        .and(path(list_path.as_str()))
        .and(query_param("$filter", "atScope()"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "a", "properties": {"principalId": "p1"}}],
            "nextLink": format!("{}/next-page?api-version=2022-04-01", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next-page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"name": "b"}, {"name": "c"}]
        })))
        .mount(&server)
        .await;

    let mut pager = client(&server).list_role_assignments_for_scope(&scope, Some("atScope()"));
    let first = pager.next_page().await.unwrap().unwrap();
    assert_eq!(first.len(), 1);
    let second = pager.next_page().await.unwrap().unwrap();
    assert_eq!(second.len(), 2);
    assert!(pager.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_role_assignment_conflict() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {"code": "RoleAssignmentExists", "message": "The role assignment already exists."}
        })))
        .mount(&server)
        .await;

    let body = RoleAssignmentCreate {
        properties: RoleAssignmentProperties {
            role_definition_id: Some("/subscriptions/s/providers/Microsoft.Authorization/roleDefinitions/r".into()),
            principal_id: Some("p".into()),
            scope: None,
        },
    };
    let err = client(&server)
        .create_role_assignment("/subscriptions/s/resourceGroups/rg", "name", &body)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_service_principal_lookup() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1.0/servicePrincipals"))
        .and(query_param("$filter", "appId eq 'app-123'"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"id": "object-1", "appId": "app-123", "displayName": "demo-disk"}]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let token = client.get_directory_token().await.unwrap();
    let principals = client
        .list_service_principals_by_app_id(&token, "app-123")
        .await
        .unwrap();
    assert_eq!(principals.len(), 1);
    assert_eq!(principals[0].id, "object-1");

    let requests = server.received_requests().await.unwrap();
    let lookup = requests
        .iter()
        .find(|r| r.url.path() == "/v1.0/servicePrincipals")
        .unwrap();
    let raw_query = lookup.url.query().unwrap();
    assert!(raw_query.starts_with("$filter=appId%20eq%20"), "{}", raw_query);
    assert!(!raw_query.contains('+'), "{}", raw_query);
}

#[tokio::test]
async fn test_list_resources_in_group() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/subscriptions/{}/resourceGroups/shared/resources",
            SUB
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                {"id": "/x/lb", "name": "abc123", "type": "Microsoft.Network/loadBalancers"},
                {"id": "/x/kv", "name": "team-vault", "type": "Microsoft.KeyVault/vaults"}
            ]
        })))
        .mount(&server)
        .await;

    let resources = client(&server)
        .list_resources_by_resource_group("shared")
        .collect_all()
        .await
        .unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(
        resources[0].resource_type.as_deref(),
        Some("Microsoft.Network/loadBalancers")
    );
}
