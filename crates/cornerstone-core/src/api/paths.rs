//! Endpoint paths on the tenant host.

/// Prefix of every OData reporting view.
pub const REPORTING_PATH: &str = "/services/api/x/odata/api/views/";

pub const SERVICE_EMPLOYEE: &str = "/services/api/x/users/v1/employees/";
pub const SERVICE_EMPLOYEE_BY_USER_ID: &str = "/services/api/x/users/v1/employees/userid-{user_id}";
pub const SERVICE_EMPLOYEE_BY_ID: &str = "/services/api/x/users/v1/employees/id-{id}";
pub const SERVICE_TRAINING_UNIT: &str = "/services/api/TrainingUnit/";
pub const SERVICE_CATALOG_SEARCH: &str = "/services/api/Catalog/GlobalSearch";
pub const SERVICE_LEARNING_OBJECT: &str = "/services/api/LO/GetDetails";
pub const SERVICE_LEARNING_OBJECT_TRANSCRIPT: &str = "/services/api/LOTranscript/TranscriptSearch";
pub const SERVICE_ENROLL_LO: &str = "/services/api/ProxyEnroll/CreateProxyEnrollment";
pub const SERVICE_ENROLL_LO_STATUS: &str = "/services/api/ProxyEnroll/ProxyEnrollmentStatus";
pub const SERVICE_CUSTOM_FIELDS: &str = "/services/api/x/users/v1/employees/customfields";
pub const SERVICE_CUSTOM_FIELDS_BY_USER: &str = "/services/api/x/users/v1/employees/userid-{user_id}/customfields";
pub const SERVICE_GROUPS: &str = "/services/api/x/users/v1/employees/groups";
pub const SERVICE_GROUPS_BY_USER: &str = "/services/api/x/users/v1/employees/userid-{user_id}/groups";
pub const SERVICE_EMPLOYMENT_STATUS: &str = "/services/api/x/users/v1/employees/id-{id}/employmentstatus";
pub const SERVICE_EMPLOYEES_STATUS: &str = "/services/api/x/users/v1/employees/employmentstatus";

/// OData reporting views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportingView {
    User,
    UserBase,
    TrainingUnitKeyCode,
    Training,
    Transcript,
    CustomFieldValue,
    OrganizationalUnit,
    /// Any other view, by slug (e.g. `vw_rpt_training`).
    Custom(String),
}

impl ReportingView {
    pub fn slug(&self) -> &str {
        match self {
            ReportingView::User => "vw_rpt_user",
            ReportingView::UserBase => "vw_rpt_user_base",
            ReportingView::TrainingUnitKeyCode => "vw_rpt_training_unit_key_code",
            ReportingView::Training => "vw_rpt_training",
            ReportingView::Transcript => "vw_rpt_transcript",
            ReportingView::CustomFieldValue => "vw_rpt_custom_field_value_local",
            ReportingView::OrganizationalUnit => "vw_rpt_ou",
            ReportingView::Custom(slug) => slug,
        }
    }

    pub fn path(&self) -> String {
        format!("{}{}", REPORTING_PATH, self.slug())
    }
}

/// Fill `{name}` placeholders in a path template.
pub fn expand(template: &str, params: &[(&str, &str)]) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{}}}", name), value)
    })
}
