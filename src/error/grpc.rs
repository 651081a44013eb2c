//! gRPC 错误处理
//!
//! 提供 DiscoveryError 到 tonic::Status 的转换，供 RPC 客户端层直接向上返回

use super::{DiscoveryError, ErrorCode};
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// 将错误代码映射为 gRPC 状态码
pub fn map_error_code(code: ErrorCode) -> Code {
    match code {
        ErrorCode::ConnectionFailed
        | ErrorCode::ServiceUnavailable
        | ErrorCode::NoAvailableInstance
        | ErrorCode::ResolverClosed => Code::Unavailable,
        ErrorCode::ConnectionTimeout => Code::DeadlineExceeded,
        ErrorCode::InvalidTarget | ErrorCode::ConfigurationError => Code::InvalidArgument,
        ErrorCode::LeaseExpired | ErrorCode::WatchCanceled => Code::Aborted,
        ErrorCode::RegistrationFailed
        | ErrorCode::WatchFailed
        | ErrorCode::DeserializationError => Code::Internal,
    }
}

impl From<DiscoveryError> for Status {
    fn from(err: DiscoveryError) -> Self {
        let code = err.code();
        let mut status = Status::new(map_error_code(code), err.to_string());
        status
            .metadata_mut()
            .insert("x-error-code", MetadataValue::from_static(code.as_str()));
        status
    }
}
