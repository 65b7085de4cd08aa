use domain::VerificationCode;
use rand::Rng;

/// 验证码生成器。测试中可替换为固定值。
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> VerificationCode;
}

/// 均匀随机的六位数字验证码（100000-999999）。
#[derive(Debug, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> VerificationCode {
        let value: u32 = rand::rng().random_range(100_000..=999_999);
        VerificationCode::from_number(value)
    }
}
