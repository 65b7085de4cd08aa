//! 对外输出的数据结构（camelCase JSON）。

use domain::{MessageWithSender, SenderProfile, Timestamp, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 认证状态中返回的完整用户信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.into(),
            email: user.email.as_str().to_owned(),
            name: user.name.as_ref().map(|n| n.as_str().to_owned()),
            username: user.username.as_ref().map(|u| u.as_str().to_owned()),
            phone: user.phone.as_ref().map(|p| p.as_str().to_owned()),
            email_verified: user.email_verified,
        }
    }
}

/// 最小的用户投影：id、邮箱、名称、用户名。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryDto {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
}

impl From<&SenderProfile> for UserSummaryDto {
    fn from(profile: &SenderProfile) -> Self {
        Self {
            id: profile.id.into(),
            email: profile.email.as_str().to_owned(),
            name: profile.name.as_ref().map(|n| n.as_str().to_owned()),
            username: profile.username.as_ref().map(|u| u.as_str().to_owned()),
        }
    }
}

impl From<&User> for UserSummaryDto {
    fn from(user: &User) -> Self {
        Self::from(&user.sender_profile())
    }
}

/// `GET /me` 的返回值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for ProfileDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.into(),
            email: user.email.as_str().to_owned(),
            name: user.name.as_ref().map(|n| n.as_str().to_owned()),
            username: user.username.as_ref().map(|u| u.as_str().to_owned()),
            email_verified: user.email_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedProfileDto {
    pub name: Option<String>,
    pub username: Option<String>,
}

impl From<&User> for UpdatedProfileDto {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.as_ref().map(|n| n.as_str().to_owned()),
            username: user.username.as_ref().map(|u| u.as_str().to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: Uuid,
    pub text: String,
    pub sender_id: Uuid,
    pub created_at: Timestamp,
    pub sender: UserSummaryDto,
}

impl From<&MessageWithSender> for MessageDto {
    fn from(value: &MessageWithSender) -> Self {
        Self {
            id: value.message.id.into(),
            text: value.message.text.as_str().to_owned(),
            sender_id: value.message.sender_id.into(),
            created_at: value.message.created_at,
            sender: UserSummaryDto::from(&value.sender),
        }
    }
}
