//! Paths on the hosted backend. Auth paths follow the identity service's API,
//! row paths are PostgREST-style endpoints keyed by table name.

pub mod path {
    use reqwest::Method;

    #[derive(Debug, Clone)]
    pub struct PathSpec {
        pub path: &'static str,
        pub method: Method,
    }

    impl PathSpec {
        pub const fn get(path: &'static str) -> Self {
            Self {
                path,
                method: Method::GET,
            }
        }

        pub const fn post(path: &'static str) -> Self {
            Self {
                path,
                method: Method::POST,
            }
        }
    }

    pub const PATH_AUTH_TOKEN: PathSpec = PathSpec::post("/auth/v1/token");
    pub const PATH_AUTH_SIGNUP: PathSpec = PathSpec::post("/auth/v1/signup");
    pub const PATH_AUTH_LOGOUT: PathSpec = PathSpec::post("/auth/v1/logout");

    pub const PATH_REST_ADMIN_USERS: PathSpec = PathSpec::get("/rest/v1/admin_users");
    pub const PATH_REST_ACCESS_GRANTS: PathSpec = PathSpec::get("/rest/v1/admin_business_access");
    pub const PATH_REST_BUSINESSES: PathSpec = PathSpec::get("/rest/v1/businesses");
    pub const PATH_REST_BUSINESSES_INSERT: PathSpec = PathSpec::post("/rest/v1/businesses");
    pub const PATH_REST_ACCESS_GRANTS_INSERT: PathSpec =
        PathSpec::post("/rest/v1/admin_business_access");

    pub const PATH_REST_EMPLOYEES: PathSpec = PathSpec::get("/rest/v1/employees");
    pub const PATH_REST_CUSTOMERS: PathSpec = PathSpec::get("/rest/v1/customers");
    pub const PATH_REST_INVENTORY: PathSpec = PathSpec::get("/rest/v1/inventory");
    pub const PATH_REST_INVOICES: PathSpec = PathSpec::get("/rest/v1/invoices");
}
