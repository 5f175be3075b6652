//! Generated types for the `sandbox` proto package.
//!
//! Checked-in output of `tonic-build` for `proto/sandbox.proto` (client
//! only), kept in-tree so builds do not require protoc. Regenerate after
//! editing the proto file.

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Source {
    #[prost(bytes = "vec", tag = "1")]
    pub source: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileResult {
    /// Captured compile stdout+stderr, possibly empty.
    #[prost(bytes = "vec", tag = "1")]
    pub data: ::prost::alloc::vec::Vec<u8>,
    /// Whether the compile command exited successfully.
    #[prost(bool, tag = "2")]
    pub success: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TestContext {
    #[prost(bytes = "vec", tag = "1")]
    pub source: ::prost::alloc::vec::Vec<u8>,
    /// When true, the reply omits the full scrubbed output and carries only
    /// its hash.
    #[prost(bool, optional, tag = "2")]
    pub opt_hash_only: ::core::option::Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TestResult {
    /// SHA-256 of the scrubbed captured output.
    #[prost(bytes = "vec", tag = "1")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    /// Full scrubbed output; present only when opt_hash_only was false.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub result: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

/// Generated client implementations.
pub mod sandbox_client {
    #![allow(
        unused_variables,
        dead_code,
        missing_docs,
        clippy::wildcard_imports,
        clippy::let_unit_value
    )]
    use tonic::codegen::http::Uri;
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct SandboxClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl SandboxClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> SandboxClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub fn with_origin(inner: T, origin: Uri) -> Self {
            let inner = tonic::client::Grpc::with_origin(inner, origin);
            Self { inner }
        }

        /// Compress requests with the given encoding.
        ///
        /// This requires the server to support it otherwise it might respond with an
        /// error.
        #[must_use]
        pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.send_compressed(encoding);
            self
        }

        /// Enable decompressing responses.
        #[must_use]
        pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.accept_compressed(encoding);
            self
        }

        /// Limits the maximum size of a decoded message.
        ///
        /// Default: `4MB`
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        /// Limits the maximum size of an encoded message.
        ///
        /// Default: `usize::MAX`
        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        /// Readiness probe. Succeeds once the worker is accepting commands.
        pub async fn ping(
            &mut self,
            request: impl tonic::IntoRequest<super::Empty>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/sandbox.Sandbox/Ping");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("sandbox.Sandbox", "Ping"));
            self.inner.unary(req, path, codec).await
        }

        /// Writes the submitted program to the configured source path and runs
        /// the compile command, capturing stdout+stderr.
        pub async fn compile(
            &mut self,
            request: impl tonic::IntoRequest<super::Source>,
        ) -> std::result::Result<tonic::Response<super::CompileResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/sandbox.Sandbox/Compile");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("sandbox.Sandbox", "Compile"));
            self.inner.unary(req, path, codec).await
        }

        /// Writes the payload to the configured test-input path and runs the test
        /// command, returning the SHA-256 of the scrubbed stdout+stderr.
        pub async fn test(
            &mut self,
            request: impl tonic::IntoRequest<super::TestContext>,
        ) -> std::result::Result<tonic::Response<super::TestResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/sandbox.Sandbox/Test");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("sandbox.Sandbox", "Test"));
            self.inner.unary(req, path, codec).await
        }

        /// The worker schedules its own termination roughly one second after
        /// replying, giving the response time to flush.
        pub async fn shutdown(
            &mut self,
            request: impl tonic::IntoRequest<super::Empty>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/sandbox.Sandbox/Shutdown");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("sandbox.Sandbox", "Shutdown"));
            self.inner.unary(req, path, codec).await
        }
    }
}
